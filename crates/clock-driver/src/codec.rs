//! Register protocol of the clock peripheral.
//!
//! One 8-bit port multiplexes three logical registers. Every byte written
//! to the port is a command:
//!
//! ```text
//!  write:   base + value      hour 0x80, minute 0xA0, second 0xC0
//!  select:  base              hour 0x00, minute 0x20, second 0x40
//! ```
//!
//! A select is followed by one port read that yields the selected field.
//!
//! The write value is added to the base without a range check. Values up to
//! 31 stay inside the field's own opcode range; minutes and seconds from 32
//! to 59 carry into the next field's range, so a single write byte is only
//! unambiguous together with the field it was encoded for. The value lane
//! is 6 bits wide, which keeps `0xC0 + 59` inside the byte.

use static_assertions::const_assert;

/// Value bits of a write command.
pub const VALUE_MASK: u8 = 0x3F;

/// Values below this never leave their own field's opcode range.
pub const UNAMBIGUOUS_LIMIT: u8 = 0x20;

/// Bit distinguishing write commands from read-select commands.
pub const WRITE_FLAG: u8 = 0x80;

const_assert!(RegisterField::Second.write_base() as u16 + VALUE_MASK as u16 <= 0xFF);
const_assert!(VALUE_MASK >= 59);
const_assert!(UNAMBIGUOUS_LIMIT > 23);

/// 8-bit opcode written to the clock port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandByte(pub u8);

impl CommandByte {
    /// Raw byte as it goes on the port.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether this command latches a value.
    #[inline]
    #[must_use]
    pub fn is_write(self) -> bool {
        self.0 & WRITE_FLAG != 0
    }
}

/// Logical registers of the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterField {
    /// Hour, 0-23.
    Hour,
    /// Minute, 0-59.
    Minute,
    /// Second, 0-59.
    Second,
}

impl RegisterField {
    /// Every field in protocol order.
    pub const ALL: [RegisterField; 3] = [Self::Hour, Self::Minute, Self::Second];

    /// Read-select opcode of this field.
    #[inline]
    #[must_use]
    pub const fn select_base(self) -> u8 {
        match self {
            Self::Hour => 0x00,
            Self::Minute => 0x20,
            Self::Second => 0x40,
        }
    }

    /// Write opcode base of this field.
    #[inline]
    #[must_use]
    pub const fn write_base(self) -> u8 {
        WRITE_FLAG | self.select_base()
    }

    /// Position of the field in the 3-byte reading.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Hour => 0,
            Self::Minute => 1,
            Self::Second => 2,
        }
    }

    /// Field that follows this one in protocol order.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Hour => Some(Self::Minute),
            Self::Minute => Some(Self::Second),
            Self::Second => None,
        }
    }
}

/// Command latching `value` into `field`.
#[inline]
#[must_use]
pub fn encode_write(field: RegisterField, value: u8) -> CommandByte {
    CommandByte(field.write_base() + (value & VALUE_MASK))
}

/// Command selecting `field` for the next port read.
#[inline]
#[must_use]
pub fn select_read(field: RegisterField) -> CommandByte {
    CommandByte(field.select_base())
}

/// Inverse of [`encode_write`] for a known field: strips the opcode base.
///
/// Returns `None` if `command` is not a write for `field`.
#[must_use]
pub fn decode_write(field: RegisterField, command: CommandByte) -> Option<u8> {
    command
        .0
        .checked_sub(field.write_base())
        .filter(|value| *value <= VALUE_MASK)
}

/// Field a write command addresses when read in isolation.
///
/// Exact only for values below [`UNAMBIGUOUS_LIMIT`]; see the module docs.
#[must_use]
pub fn classify_write(command: CommandByte) -> Option<RegisterField> {
    match command.0 {
        0x80..=0x9F => Some(RegisterField::Hour),
        0xA0..=0xBF => Some(RegisterField::Minute),
        0xC0..=0xFF => Some(RegisterField::Second),
        _ => None,
    }
}

/// Inverse of [`select_read`].
#[must_use]
pub fn decode_select(command: CommandByte) -> Option<RegisterField> {
    RegisterField::ALL
        .into_iter()
        .find(|field| field.select_base() == command.0)
}
