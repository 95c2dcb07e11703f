//! Single 8-bit I/O port access.
//!
//! [`PortIo`] is the narrow interface the protocol needs: one output and one
//! input operation on a fixed address. Enabling access is a separate,
//! fallible step performed once before the port is shared; after that the
//! byte operations are assumed to always complete.

use clock_common::error::{ClockError, ClockResult};
use tracing::{debug, info};

/// 8-bit port at a fixed address.
pub trait PortIo: Send {
    /// Address of the port.
    fn base(&self) -> u16;

    /// Obtain access to the port.
    ///
    /// Called once while the driver context is constructed. Failure is fatal
    /// to initialization.
    fn enable(&mut self) -> ClockResult<()>;

    /// Write one byte to the port.
    fn outb(&mut self, value: u8);

    /// Read one byte from the port.
    fn inb(&mut self) -> u8;
}

impl<P: PortIo + ?Sized> PortIo for Box<P> {
    fn base(&self) -> u16 {
        (**self).base()
    }

    fn enable(&mut self) -> ClockResult<()> {
        (**self).enable()
    }

    fn outb(&mut self, value: u8) {
        (**self).outb(value);
    }

    fn inb(&mut self) -> u8 {
        (**self).inb()
    }
}

/// Hardware port accessed with the x86 `in`/`out` instructions.
///
/// Requires `CAP_SYS_RAWIO`. Only Linux on x86 and x86_64 can enable it;
/// elsewhere [`PortIo::enable`] always fails.
#[derive(Debug)]
pub struct RawPort {
    base: u16,
    enabled: bool,
}

impl RawPort {
    /// Create a handle for the port at `base`. No access is requested yet.
    pub fn new(base: u16) -> Self {
        Self {
            base,
            enabled: false,
        }
    }

    /// Whether [`PortIo::enable`] has succeeded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl PortIo for RawPort {
    fn base(&self) -> u16 {
        self.base
    }

    #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
    fn enable(&mut self) -> ClockResult<()> {
        if self.enabled {
            return Ok(());
        }

        debug!(port = self.base, "Requesting port access with ioperm");

        // SAFETY: ioperm only changes this process's I/O permission bitmap.
        let rc = unsafe { libc::ioperm(libc::c_ulong::from(self.base), 1, 1) };
        if rc != 0 {
            return Err(ClockError::PortAccess {
                port: self.base,
                reason: format!("ioperm: {}", nix::errno::Errno::last()),
            });
        }

        self.enabled = true;
        info!(port = self.base, "Port access enabled");
        Ok(())
    }

    #[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
    fn enable(&mut self) -> ClockResult<()> {
        Err(ClockError::PortAccess {
            port: self.base,
            reason: "port I/O is only supported on Linux x86".into(),
        })
    }

    #[inline]
    fn outb(&mut self, value: u8) {
        debug_assert!(self.enabled, "outb on a port that was never enabled");
        #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
        // SAFETY: access to `base` was granted by ioperm in `enable`.
        unsafe {
            std::arch::asm!("out dx, al", in("dx") self.base, in("al") value, options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
        let _ = value;
    }

    #[inline]
    fn inb(&mut self) -> u8 {
        debug_assert!(self.enabled, "inb on a port that was never enabled");
        #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
        {
            let value: u8;
            // SAFETY: access to `base` was granted by ioperm in `enable`.
            unsafe {
                std::arch::asm!("in al, dx", in("dx") self.base, out("al") value, options(nomem, nostack, preserves_flags));
            }
            value
        }
        #[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
        0
    }
}
