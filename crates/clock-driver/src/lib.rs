//! Driver core for the FPGA real-time clock peripheral.
//!
//! This crate provides:
//! - [`PortLock`] spin lock serializing all access to the clock port
//! - [`codec`] with the command-byte register protocol
//! - [`ClockSyncHandler`] writing host time into the peripheral on each sync signal
//! - [`ClockReadInterface`] reading the stored time back on each query
//! - [`ClockDriver`] init and teardown against a [`HostBus`]
//! - [`simulated`] peripheral and host for running without hardware

pub mod clock;
pub mod codec;
pub mod context;
pub mod host;
pub mod lifecycle;
pub mod lock;
pub mod port;
pub mod read_interface;
#[cfg(feature = "simulated")]
pub mod simulated;
pub mod sync_handler;
pub mod ticker;

pub use clock::{FixedClock, HostClock, SystemClock};
pub use codec::{encode_write, select_read, CommandByte, RegisterField};
pub use context::ClockContext;
pub use host::{DriverAttribute, HostBus, IrqHandler, IrqReturn};
pub use lifecycle::ClockDriver;
pub use lock::{PortGuard, PortLock};
pub use port::{PortIo, RawPort};
pub use read_interface::{ClockReadInterface, ClockReading};
pub use sync_handler::{ClockSyncHandler, SyncPhase};
pub use ticker::Ticker;
