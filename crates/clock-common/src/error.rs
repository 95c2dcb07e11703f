use thiserror::Error;

/// Clock driver error types covering port access, registration and the read-only surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The I/O port could not be enabled for access.
    #[error("port access denied for {port:#06x}: {reason}")]
    PortAccess {
        /// Port address.
        port: u16,
        /// Why the port could not be enabled.
        reason: String,
    },

    /// Write attempted on the read-only clock attribute.
    #[error("clock attribute is read-only")]
    ReadOnly,

    /// Driver could not be registered with the device model.
    #[error("driver registration failed: {0}")]
    DriverRegistration(String),

    /// Query attribute could not be created.
    #[error("attribute creation failed: {0}")]
    AttributeCreation(String),

    /// Interrupt line could not be obtained.
    #[error("IRQ {irq} request failed: {reason}")]
    IrqRequest {
        /// Interrupt line number.
        irq: u32,
        /// Why the request was refused.
        reason: String,
    },

    /// Caller-provided buffer cannot hold the reading.
    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Required length.
        needed: usize,
        /// Supplied length.
        actual: usize,
    },

    /// No driver, attribute or interrupt line by that name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid lifecycle transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl ClockError {
    /// Negative errno the host device model reports for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::Config(_) | Self::BufferTooSmall { .. } => libc::EINVAL,
            Self::PortAccess { .. } => libc::EPERM,
            Self::ReadOnly => libc::EROFS,
            Self::IrqRequest { .. } => libc::EBUSY,
            Self::DriverRegistration(_) | Self::AttributeCreation(_) => libc::EEXIST,
            Self::NotFound(_) => libc::ENOENT,
            Self::InvalidStateTransition { .. } => libc::EIO,
        };
        -code
    }
}

/// Convenience type alias for clock driver operations.
pub type ClockResult<T> = Result<T, ClockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_maps_to_erofs() {
        assert_eq!(ClockError::ReadOnly.errno(), -libc::EROFS);
    }

    #[test]
    fn test_duplicate_registration_maps_to_eexist() {
        assert_eq!(ClockError::DriverRegistration("fpga_clock".into()).errno(), -libc::EEXIST);
        assert_eq!(ClockError::AttributeCreation("fpga_clock".into()).errno(), -libc::EEXIST);
        assert_eq!(ClockError::NotFound("fpga_clock".into()).errno(), -libc::ENOENT);
        assert_eq!(
            ClockError::InvalidStateTransition {
                from: "RUNNING".into(),
                to: "UNLOADED".into(),
            }
            .errno(),
            -libc::EIO
        );
    }

    #[test]
    fn test_display_includes_port() {
        let err = ClockError::PortAccess {
            port: 0x233,
            reason: "ioperm: EPERM".into(),
        };
        assert_eq!(
            err.to_string(),
            "port access denied for 0x0233: ioperm: EPERM"
        );
        assert_eq!(err.errno(), -libc::EPERM);
    }
}
