//! Interfaces the driver needs from its host.
//!
//! The host owns the device model, the interrupt controller and the
//! attribute filesystem. The driver only registers itself through
//! [`HostBus`] and is then called back through [`IrqHandler`] and
//! [`DriverAttribute`].

use clock_common::error::ClockResult;
use std::sync::Arc;

/// Outcome of an interrupt handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not for this handler.
    None,
    /// The interrupt was serviced.
    Handled,
}

/// Callback invoked when an interrupt line fires.
///
/// Runs in a context that must not sleep or block.
pub trait IrqHandler: Send + Sync {
    /// Service interrupt `irq`.
    fn handle(&self, irq: u32) -> IrqReturn;
}

/// File-like attribute exposed by a driver.
pub trait DriverAttribute: Send + Sync {
    /// Attribute name as seen by readers.
    fn name(&self) -> &str;

    /// Permission bits.
    fn mode(&self) -> u32;

    /// Fill `buf` with the attribute's value and return the length written.
    fn show(&self, buf: &mut [u8]) -> ClockResult<usize>;

    /// Apply a write of `buf`, returning the number of bytes consumed.
    fn store(&self, buf: &[u8]) -> ClockResult<usize>;
}

/// Registration surface of the host device model.
///
/// Release operations never fail; they tolerate names that were never
/// registered.
pub trait HostBus: Send + Sync {
    /// Register a driver by name.
    fn register_driver(&self, name: &str) -> ClockResult<()>;

    /// Remove a registered driver.
    fn unregister_driver(&self, name: &str);

    /// Publish `attribute` under a registered driver.
    fn create_file(&self, driver: &str, attribute: Arc<dyn DriverAttribute>) -> ClockResult<()>;

    /// Withdraw an attribute.
    fn remove_file(&self, driver: &str, attribute: &str);

    /// Subscribe `handler` to interrupt line `irq`.
    fn request_irq(&self, irq: u32, owner: &str, handler: Arc<dyn IrqHandler>) -> ClockResult<()>;

    /// Release interrupt line `irq`; no handler call starts after this returns.
    fn free_irq(&self, irq: u32, owner: &str);
}
