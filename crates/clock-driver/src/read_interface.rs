//! Read path: report the time currently stored in the peripheral.
//!
//! A query selects each field and reads it back under the port lock, then
//! returns the three raw bytes. Stored values are not validated; whatever
//! the peripheral holds is what the reader sees.

use crate::codec::{select_read, RegisterField};
use crate::context::ClockContext;
use crate::host::DriverAttribute;
use crate::port::PortIo;
use clock_common::error::{ClockError, ClockResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Length of a reading on the query surface.
pub const READING_LEN: usize = 3;

/// Owner-read-only permission of the clock attribute.
pub const ATTRIBUTE_MODE: u32 = 0o400;

/// Raw hour, minute and second bytes read from the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClockReading([u8; READING_LEN]);

impl ClockReading {
    /// Wrap three raw bytes in protocol order.
    pub const fn from_bytes(bytes: [u8; READING_LEN]) -> Self {
        Self(bytes)
    }

    /// Stored hour byte.
    pub fn hour(&self) -> u8 {
        self.0[RegisterField::Hour.index()]
    }

    /// Stored minute byte.
    pub fn minute(&self) -> u8 {
        self.0[RegisterField::Minute.index()]
    }

    /// Stored second byte.
    pub fn second(&self) -> u8 {
        self.0[RegisterField::Second.index()]
    }

    /// Bytes as they appear on the query surface.
    pub fn as_bytes(&self) -> &[u8; READING_LEN] {
        &self.0
    }
}

impl fmt::Display for ClockReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour(), self.minute(), self.second())
    }
}

/// Read-only query endpoint of the peripheral.
pub struct ClockReadInterface<P> {
    context: Arc<ClockContext<P>>,
    name: String,
}

impl<P: PortIo> ClockReadInterface<P> {
    /// Endpoint `name` over `context`.
    pub fn new(context: Arc<ClockContext<P>>, name: impl Into<String>) -> Self {
        Self {
            context,
            name: name.into(),
        }
    }

    /// Read the peripheral's stored time.
    pub fn read(&self) -> ClockReading {
        read_registers(&self.context)
    }
}

impl<P: PortIo> DriverAttribute for ClockReadInterface<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> u32 {
        ATTRIBUTE_MODE
    }

    fn show(&self, buf: &mut [u8]) -> ClockResult<usize> {
        if buf.len() < READING_LEN {
            return Err(ClockError::BufferTooSmall {
                needed: READING_LEN,
                actual: buf.len(),
            });
        }

        let reading = self.read();
        buf[..READING_LEN].copy_from_slice(reading.as_bytes());
        debug!(attribute = %self.name, %reading, "Clock attribute read");
        Ok(READING_LEN)
    }

    fn store(&self, buf: &[u8]) -> ClockResult<usize> {
        warn!(
            attribute = %self.name,
            len = buf.len(),
            "Rejected write to read-only clock attribute"
        );
        Err(ClockError::ReadOnly)
    }
}

impl<P> fmt::Debug for ClockReadInterface<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockReadInterface")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Select and read hour, minute, then second in one locked transaction.
pub fn read_registers<P: PortIo>(context: &ClockContext<P>) -> ClockReading {
    let mut bytes = [0u8; READING_LEN];

    let mut port = context.lock();
    for field in RegisterField::ALL {
        port.outb(select_read(field).bits());
        bytes[field.index()] = port.inb();
    }
    drop(port);

    ClockReading(bytes)
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::simulated::{LatchingPeripheral, PortOp, RecordingPort};

    #[test]
    fn test_reads_latched_fields() {
        let mut peripheral = LatchingPeripheral::new(0x233);
        peripheral.preset(14, 5, 9);
        let (port, journal) = RecordingPort::wrap(peripheral);
        let reader = ClockReadInterface::new(Arc::new(ClockContext::new(port).unwrap()), "fpga_clock");

        let reading = reader.read();
        assert_eq!(reading, ClockReading::from_bytes([14, 5, 9]));
        assert_eq!(reading.to_string(), "14:05:09");
        assert_eq!(
            journal.take(),
            vec![
                PortOp::Out(0x00),
                PortOp::In(14),
                PortOp::Out(0x20),
                PortOp::In(5),
                PortOp::Out(0x40),
                PortOp::In(9),
            ]
        );
    }

    #[test]
    fn test_show_fills_three_bytes() {
        let mut peripheral = LatchingPeripheral::new(0x233);
        peripheral.preset(23, 59, 59);
        let reader = ClockReadInterface::new(Arc::new(ClockContext::new(peripheral).unwrap()), "fpga_clock");

        let mut buf = [0xAAu8; 8];
        assert_eq!(reader.show(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..4], &[23, 59, 59, 0xAA]);
        assert_eq!(reader.mode(), 0o400);
        assert_eq!(reader.name(), "fpga_clock");
    }

    #[test]
    fn test_short_buffer_rejected_without_port_activity() {
        let (port, journal) = RecordingPort::new(0x233);
        let reader = ClockReadInterface::new(Arc::new(ClockContext::new(port).unwrap()), "fpga_clock");

        let mut buf = [0u8; 2];
        let err = reader.show(&mut buf).unwrap_err();
        assert_eq!(err, ClockError::BufferTooSmall { needed: 3, actual: 2 });
        assert!(journal.take().is_empty());
    }

    #[test]
    fn test_store_is_read_only() {
        let (port, journal) = RecordingPort::new(0x233);
        let reader = ClockReadInterface::new(Arc::new(ClockContext::new(port).unwrap()), "fpga_clock");

        assert_eq!(reader.store(&[12, 0, 0]), Err(ClockError::ReadOnly));
        assert_eq!(reader.store(&[]), Err(ClockError::ReadOnly));
        assert!(journal.take().is_empty());
    }

    #[test]
    fn test_reading_serializes_as_bytes() {
        let json = serde_json::to_string(&ClockReading::from_bytes([1, 2, 3])).unwrap();
        assert_eq!(json, "[1,2,3]");
    }
}
