//! Driver init and teardown against a [`HostBus`].
//!
//! Init order: enable port, register driver, publish the clock attribute,
//! subscribe the sync interrupt. A failing step undoes every earlier step in
//! reverse order, so a failed init leaves nothing registered. Teardown
//! releases the interrupt first, so no sync handler starts once the
//! attribute and driver are gone.

use crate::clock::HostClock;
use crate::context::ClockContext;
use crate::host::HostBus;
use crate::port::PortIo;
use crate::read_interface::{ClockReadInterface, ClockReading};
use crate::sync_handler::ClockSyncHandler;
use clock_common::config::DeviceConfig;
use clock_common::error::{ClockError, ClockResult};
use clock_common::state::DriverState;
use std::sync::Arc;
use tracing::{error, info};

/// A clock peripheral registered with its host.
pub struct ClockDriver<P, C>
where
    P: PortIo + 'static,
    C: HostClock + 'static,
{
    device: DeviceConfig,
    bus: Arc<dyn HostBus>,
    context: Arc<ClockContext<P>>,
    sync_handler: Arc<ClockSyncHandler<P, C>>,
    read_interface: Arc<ClockReadInterface<P>>,
    state: DriverState,
}

impl<P, C> ClockDriver<P, C>
where
    P: PortIo + 'static,
    C: HostClock + 'static,
{
    /// Bring the driver up on `bus`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error after rolling back the steps
    /// that had succeeded.
    pub fn init(device: &DeviceConfig, bus: Arc<dyn HostBus>, port: P, clock: C) -> ClockResult<Self> {
        let name = device.name.as_str();
        if port.base() != device.port_base {
            error!(driver = name, port = port.base(), configured = device.port_base, "Port does not match device");
            return Err(ClockError::Config(format!(
                "port {:#x} does not match device.port_base {:#x}",
                port.base(),
                device.port_base
            )));
        }

        let context = Arc::new(ClockContext::new(port)?);
        let mut state = DriverState::Unloaded;

        if let Err(e) = bus.register_driver(name) {
            error!(driver = name, error = %e, "Driver registration failed");
            return Err(e);
        }
        state.transition_to(DriverState::Registered)?;

        let read_interface = Arc::new(ClockReadInterface::new(
            Arc::clone(&context),
            device.attribute.clone(),
        ));
        if let Err(e) = bus.create_file(name, read_interface.clone()) {
            error!(driver = name, attribute = %device.attribute, error = %e, "Attribute creation failed");
            roll_back(bus.as_ref(), device, &mut state)?;
            return Err(e);
        }
        state.transition_to(DriverState::Published)?;

        let sync_handler = Arc::new(ClockSyncHandler::new(Arc::clone(&context), clock, device.irq));
        if let Err(e) = bus.request_irq(device.irq, name, sync_handler.clone()) {
            error!(driver = name, irq = device.irq, error = %e, "IRQ request failed");
            roll_back(bus.as_ref(), device, &mut state)?;
            return Err(e);
        }
        state.transition_to(DriverState::Running)?;

        info!(
            driver = name,
            port = context.base(),
            irq = device.irq,
            "Clock driver initialized"
        );

        Ok(Self {
            device: device.clone(),
            bus,
            context,
            sync_handler,
            read_interface,
            state,
        })
    }

    /// Unregister from the host.
    ///
    /// # Errors
    ///
    /// Fails only if the driver is not running.
    pub fn teardown(mut self) -> ClockResult<()> {
        self.release()
    }

    fn release(&mut self) -> ClockResult<()> {
        self.state.transition_to(DriverState::TearingDown)?;

        let name = self.device.name.as_str();
        self.bus.free_irq(self.device.irq, name);
        self.bus.remove_file(name, &self.device.attribute);
        self.bus.unregister_driver(name);

        self.state.transition_to(DriverState::Unloaded)?;
        info!(
            driver = name,
            syncs = self.sync_handler.syncs(),
            "Clock driver removed"
        );
        Ok(())
    }

    /// Lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Device identity and resources.
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    /// Shared port context.
    pub fn context(&self) -> &Arc<ClockContext<P>> {
        &self.context
    }

    /// Interrupt-side write path.
    pub fn sync_handler(&self) -> &Arc<ClockSyncHandler<P, C>> {
        &self.sync_handler
    }

    /// Query-side read path.
    pub fn read_interface(&self) -> &Arc<ClockReadInterface<P>> {
        &self.read_interface
    }

    /// Read the peripheral's stored time directly.
    pub fn reading(&self) -> ClockReading {
        self.read_interface.read()
    }
}

/// Undo the registration steps a partial init completed, newest first.
fn roll_back(bus: &dyn HostBus, device: &DeviceConfig, state: &mut DriverState) -> ClockResult<()> {
    let name = device.name.as_str();
    if state.is_readable() {
        bus.remove_file(name, &device.attribute);
    }
    bus.unregister_driver(name);
    state.transition_to(DriverState::Unloaded)
}

impl<P, C> Drop for ClockDriver<P, C>
where
    P: PortIo + 'static,
    C: HostClock + 'static,
{
    fn drop(&mut self) {
        if self.state == DriverState::Running {
            let _ = self.release();
        }
    }
}

impl<P, C> std::fmt::Debug for ClockDriver<P, C>
where
    P: PortIo + 'static,
    C: HostClock + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockDriver")
            .field("device", &self.device)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
