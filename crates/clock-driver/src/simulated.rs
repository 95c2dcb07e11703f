//! In-memory peripheral and host for running the driver without hardware.
//!
//! - [`LatchingPeripheral`] models the FPGA clock register file
//! - [`RecordingPort`] journals every port operation of a wrapped port
//! - [`SimulatedBus`] models the host device model and interrupt controller

use crate::codec::{classify_write, decode_select, decode_write, CommandByte, RegisterField};
use crate::host::{DriverAttribute, HostBus, IrqHandler, IrqReturn};
use crate::port::PortIo;
use clock_common::error::{ClockError, ClockResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

/// Value the port floats to when no field is selected.
pub const FLOATING_BUS: u8 = 0xFF;

/// Model of the clock peripheral's register file.
///
/// Write commands latch a value into a field. The hour write opens a frame
/// in which the next writes are taken as minute and then second, so values
/// from 32 to 59 land in the right register even though their bytes overlap
/// the next field's opcode range. Outside a frame a write is decoded from its
/// opcode range alone. A read-select command picks the field later `inb`
/// calls return.
#[derive(Debug, Clone)]
pub struct LatchingPeripheral {
    base: u16,
    registers: [u8; 3],
    selected: Option<RegisterField>,
    expected: Option<RegisterField>,
    enabled: bool,
    deny_enable: bool,
}

impl LatchingPeripheral {
    /// Peripheral at `base` with all registers cleared.
    pub fn new(base: u16) -> Self {
        Self {
            base,
            registers: [0; 3],
            selected: None,
            expected: None,
            enabled: false,
            deny_enable: false,
        }
    }

    /// Peripheral whose [`PortIo::enable`] always fails.
    pub fn denying(base: u16) -> Self {
        Self {
            deny_enable: true,
            ..Self::new(base)
        }
    }

    /// Load register contents directly, bypassing the port.
    pub fn preset(&mut self, hour: u8, minute: u8, second: u8) {
        self.registers = [hour, minute, second];
    }

    /// Current register contents in protocol order.
    pub fn registers(&self) -> [u8; 3] {
        self.registers
    }

    /// Whether the port has been enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn latch(&mut self, command: CommandByte) {
        let framed = self
            .expected
            .and_then(|field| decode_write(field, command).map(|value| (field, value)));
        let decoded = framed.or_else(|| {
            classify_write(command)
                .and_then(|field| decode_write(field, command).map(|value| (field, value)))
        });

        if let Some((field, value)) = decoded {
            self.registers[field.index()] = value;
            self.expected = field.next();
        }
    }
}

impl PortIo for LatchingPeripheral {
    fn base(&self) -> u16 {
        self.base
    }

    fn enable(&mut self) -> ClockResult<()> {
        if self.deny_enable {
            return Err(ClockError::PortAccess {
                port: self.base,
                reason: "simulated access denial".into(),
            });
        }
        self.enabled = true;
        Ok(())
    }

    fn outb(&mut self, value: u8) {
        let command = CommandByte(value);
        if command.is_write() {
            self.latch(command);
        } else {
            self.selected = decode_select(command);
        }
    }

    fn inb(&mut self) -> u8 {
        self.selected
            .map_or(FLOATING_BUS, |field| self.registers[field.index()])
    }
}

/// One operation observed on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOp {
    /// Byte written.
    Out(u8),
    /// Byte read back.
    In(u8),
}

/// Shared, ordered log of port operations.
#[derive(Debug, Clone, Default)]
pub struct PortJournal {
    ops: Arc<Mutex<Vec<PortOp>>>,
}

impl PortJournal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, op: PortOp) {
        lock_ignoring_poison(&self.ops).push(op);
    }

    /// Copy of every operation recorded so far.
    pub fn snapshot(&self) -> Vec<PortOp> {
        lock_ignoring_poison(&self.ops).clone()
    }

    /// Drain the journal.
    pub fn take(&self) -> Vec<PortOp> {
        std::mem::take(&mut *lock_ignoring_poison(&self.ops))
    }

    /// Number of operations recorded.
    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.ops).len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Port wrapper that journals every operation of its inner port.
#[derive(Debug)]
pub struct RecordingPort<P = LatchingPeripheral> {
    inner: P,
    journal: PortJournal,
}

impl RecordingPort {
    /// Recording port over a fresh [`LatchingPeripheral`].
    pub fn new(base: u16) -> (Self, PortJournal) {
        Self::wrap(LatchingPeripheral::new(base))
    }
}

impl<P: PortIo> RecordingPort<P> {
    /// Journal every operation on `inner`.
    pub fn wrap(inner: P) -> (Self, PortJournal) {
        let journal = PortJournal::new();
        (
            Self {
                inner,
                journal: journal.clone(),
            },
            journal,
        )
    }
}

impl<P: PortIo> PortIo for RecordingPort<P> {
    fn base(&self) -> u16 {
        self.inner.base()
    }

    fn enable(&mut self) -> ClockResult<()> {
        self.inner.enable()
    }

    fn outb(&mut self, value: u8) {
        self.journal.push(PortOp::Out(value));
        self.inner.outb(value);
    }

    fn inb(&mut self) -> u8 {
        let value = self.inner.inb();
        self.journal.push(PortOp::In(value));
        value
    }
}

/// Registration steps that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStep {
    /// [`HostBus::register_driver`].
    RegisterDriver,
    /// [`HostBus::create_file`].
    CreateFile,
    /// [`HostBus::request_irq`].
    RequestIrq,
}

/// Registration activity observed by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Driver registered.
    DriverRegistered(String),
    /// Driver removed.
    DriverUnregistered(String),
    /// Attribute published.
    FileCreated {
        /// Owning driver.
        driver: String,
        /// Attribute name.
        attribute: String,
    },
    /// Attribute withdrawn.
    FileRemoved {
        /// Owning driver.
        driver: String,
        /// Attribute name.
        attribute: String,
    },
    /// Interrupt line subscribed.
    IrqRequested {
        /// Line number.
        irq: u32,
        /// Subscriber name.
        owner: String,
    },
    /// Interrupt line released.
    IrqFreed {
        /// Line number.
        irq: u32,
        /// Subscriber name.
        owner: String,
    },
}

struct IrqLine {
    irq: u32,
    owner: String,
    handler: Arc<dyn IrqHandler>,
}

struct Attribute {
    driver: String,
    attribute: Arc<dyn DriverAttribute>,
}

#[derive(Default)]
struct Registry {
    drivers: Vec<String>,
    failures: Vec<BusStep>,
    events: Vec<BusEvent>,
}

/// In-memory host device model.
///
/// Interrupt lines are exclusive, as requested without a sharing flag.
/// Interrupt dispatch, attribute access and registration each have their own
/// lock, so a dispatch in flight never serializes attribute readers; only the
/// port lock orders them.
#[derive(Default)]
pub struct SimulatedBus {
    registry: Mutex<Registry>,
    attributes: RwLock<Vec<Attribute>>,
    lines: RwLock<Vec<IrqLine>>,
}

impl SimulatedBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `step` fail once.
    pub fn fail_next(&self, step: BusStep) {
        lock_ignoring_poison(&self.registry).failures.push(step);
    }

    /// Fire interrupt line `irq`.
    ///
    /// Returns [`IrqReturn::Handled`] if the subscribed handler serviced it.
    pub fn raise_irq(&self, irq: u32) -> IrqReturn {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        lines
            .iter()
            .filter(|line| line.irq == irq)
            .map(|line| line.handler.handle(irq))
            .fold(IrqReturn::None, |acc, ret| {
                if ret == IrqReturn::Handled {
                    IrqReturn::Handled
                } else {
                    acc
                }
            })
    }

    /// Deliver `irq` to every subscribed handler regardless of line.
    ///
    /// Models a shared interrupt vector; handlers must reject foreign lines.
    pub fn broadcast_irq(&self, irq: u32) -> Vec<IrqReturn> {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        lines.iter().map(|line| line.handler.handle(irq)).collect()
    }

    /// Read attribute `name` of `driver` into `buf`.
    ///
    /// # Errors
    ///
    /// [`ClockError::NotFound`] if no such attribute exists, otherwise the
    /// attribute's own error.
    pub fn read_attribute(&self, driver: &str, name: &str, buf: &mut [u8]) -> ClockResult<usize> {
        let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        find_attribute(&attributes, driver, name)?.show(buf)
    }

    /// Write `buf` to attribute `name` of `driver`.
    ///
    /// # Errors
    ///
    /// [`ClockError::NotFound`] if no such attribute exists, otherwise the
    /// attribute's own error.
    pub fn write_attribute(&self, driver: &str, name: &str, buf: &[u8]) -> ClockResult<usize> {
        let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        find_attribute(&attributes, driver, name)?.store(buf)
    }

    /// Permission bits of an attribute, if published.
    pub fn attribute_mode(&self, driver: &str, name: &str) -> Option<u32> {
        let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        find_attribute(&attributes, driver, name)
            .ok()
            .map(|attribute| attribute.mode())
    }

    /// Whether `name` is a registered driver.
    pub fn is_driver_registered(&self, name: &str) -> bool {
        lock_ignoring_poison(&self.registry)
            .drivers
            .iter()
            .any(|d| d == name)
    }

    /// Number of published attributes.
    pub fn attribute_count(&self) -> usize {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether interrupt line `irq` has a subscriber.
    pub fn is_irq_requested(&self, irq: u32) -> bool {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.irq == irq)
    }

    /// Registration activity so far, oldest first.
    pub fn events(&self) -> Vec<BusEvent> {
        lock_ignoring_poison(&self.registry).events.clone()
    }

    fn take_failure(&self, step: BusStep) -> bool {
        let mut registry = lock_ignoring_poison(&self.registry);
        match registry.failures.iter().position(|s| *s == step) {
            Some(index) => {
                registry.failures.remove(index);
                true
            }
            None => false,
        }
    }

    fn record(&self, event: BusEvent) {
        debug!(?event, "Simulated bus event");
        lock_ignoring_poison(&self.registry).events.push(event);
    }
}

impl HostBus for SimulatedBus {
    fn register_driver(&self, name: &str) -> ClockResult<()> {
        if self.take_failure(BusStep::RegisterDriver) {
            return Err(ClockError::DriverRegistration(format!(
                "injected failure registering {name}"
            )));
        }
        {
            let mut registry = lock_ignoring_poison(&self.registry);
            if registry.drivers.iter().any(|d| d == name) {
                return Err(ClockError::DriverRegistration(format!(
                    "driver {name} already registered"
                )));
            }
            registry.drivers.push(name.to_owned());
        }
        self.record(BusEvent::DriverRegistered(name.to_owned()));
        Ok(())
    }

    fn unregister_driver(&self, name: &str) {
        let removed = {
            let mut registry = lock_ignoring_poison(&self.registry);
            let before = registry.drivers.len();
            registry.drivers.retain(|d| d != name);
            registry.drivers.len() != before
        };
        if removed {
            self.record(BusEvent::DriverUnregistered(name.to_owned()));
        }
    }

    fn create_file(&self, driver: &str, attribute: Arc<dyn DriverAttribute>) -> ClockResult<()> {
        if self.take_failure(BusStep::CreateFile) {
            return Err(ClockError::AttributeCreation(format!(
                "injected failure creating {}",
                attribute.name()
            )));
        }
        if !self.is_driver_registered(driver) {
            return Err(ClockError::AttributeCreation(format!(
                "driver {driver} is not registered"
            )));
        }

        let name = attribute.name().to_owned();
        {
            let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
            if find_attribute(&attributes, driver, &name).is_ok() {
                return Err(ClockError::AttributeCreation(format!(
                    "attribute {name} already exists"
                )));
            }
            attributes.push(Attribute {
                driver: driver.to_owned(),
                attribute,
            });
        }
        self.record(BusEvent::FileCreated {
            driver: driver.to_owned(),
            attribute: name,
        });
        Ok(())
    }

    fn remove_file(&self, driver: &str, attribute: &str) {
        let removed = {
            let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
            let before = attributes.len();
            attributes.retain(|a| !(a.driver == driver && a.attribute.name() == attribute));
            attributes.len() != before
        };
        if removed {
            self.record(BusEvent::FileRemoved {
                driver: driver.to_owned(),
                attribute: attribute.to_owned(),
            });
        }
    }

    fn request_irq(&self, irq: u32, owner: &str, handler: Arc<dyn IrqHandler>) -> ClockResult<()> {
        if self.take_failure(BusStep::RequestIrq) {
            return Err(ClockError::IrqRequest {
                irq,
                reason: "injected failure".into(),
            });
        }
        {
            let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(line) = lines.iter().find(|line| line.irq == irq) {
                return Err(ClockError::IrqRequest {
                    irq,
                    reason: format!("line busy, owned by {}", line.owner),
                });
            }
            lines.push(IrqLine {
                irq,
                owner: owner.to_owned(),
                handler,
            });
        }
        self.record(BusEvent::IrqRequested {
            irq,
            owner: owner.to_owned(),
        });
        Ok(())
    }

    fn free_irq(&self, irq: u32, owner: &str) {
        // Taking the write lock waits out any dispatch in flight
        let removed = {
            let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
            let before = lines.len();
            lines.retain(|line| !(line.irq == irq && line.owner == owner));
            lines.len() != before
        };
        if removed {
            self.record(BusEvent::IrqFreed {
                irq,
                owner: owner.to_owned(),
            });
        }
    }
}

impl std::fmt::Debug for SimulatedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBus")
            .field("attributes", &self.attribute_count())
            .finish_non_exhaustive()
    }
}

fn find_attribute<'a>(
    attributes: &'a [Attribute],
    driver: &str,
    name: &str,
) -> ClockResult<&'a Arc<dyn DriverAttribute>> {
    attributes
        .iter()
        .find(|a| a.driver == driver && a.attribute.name() == name)
        .map(|a| &a.attribute)
        .ok_or_else(|| ClockError::NotFound(format!("{driver}/{name}")))
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
