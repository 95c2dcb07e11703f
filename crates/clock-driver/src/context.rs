//! Shared driver context.
//!
//! One [`ClockContext`] exists per peripheral. It owns the port behind its
//! [`PortLock`] and is handed by reference (through an `Arc`) to both the
//! sync handler and the read interface, so neither path can reach the port
//! without taking the lock.

use crate::lock::{PortGuard, PortLock};
use crate::port::PortIo;
use clock_common::error::ClockResult;
use tracing::{debug, error};

/// Lock-guarded port of one clock peripheral.
#[derive(Debug)]
pub struct ClockContext<P> {
    port: PortLock<P>,
    base: u16,
}

impl<P: PortIo> ClockContext<P> {
    /// Enable `port` and take ownership of it.
    ///
    /// # Errors
    ///
    /// Returns the port's enable error; the context is never built over a
    /// port that could not be enabled.
    pub fn new(mut port: P) -> ClockResult<Self> {
        let base = port.base();
        if let Err(e) = port.enable() {
            error!(port = base, error = %e, "Port enable failed");
            return Err(e);
        }
        debug!(port = base, "Clock context ready");

        Ok(Self {
            port: PortLock::new(port),
            base,
        })
    }

    /// Acquire exclusive use of the port for one transaction.
    #[inline]
    pub fn lock(&self) -> PortGuard<'_, P> {
        self.port.lock()
    }

    /// Address of the peripheral's port.
    pub fn base(&self) -> u16 {
        self.base
    }
}
