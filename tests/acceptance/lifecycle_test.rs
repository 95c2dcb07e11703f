//! Lifecycle acceptance tests.
//!
//! These tests bring the driver up from a configuration file, let a
//! periodic ticker drive the sync interrupt and tear everything down,
//! checking what the host observes at each stage.
//!
//! # Acceptance Criteria
//!
//! - A configured driver publishes a read-only attribute and one IRQ line
//! - Periodic sync keeps the peripheral at the host's local time
//! - Teardown and failed bring-up leave nothing registered

use super::common::{is_root, wait_until, Rig, EPOCH};
use clock_common::config::{ClockConfig, TimezoneSource};
use clock_common::error::ClockError;
use clock_common::state::DriverState;
use clock_driver::simulated::{BusEvent, BusStep, LatchingPeripheral, SimulatedBus};
use clock_driver::{ClockDriver, FixedClock, IrqReturn, PortIo, RawPort, Ticker};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
[device]
name = "board_clock"
attribute = "time"
port_base = 0x300
irq = 5

[port]
backend = "simulated"

[sync]
interval = "5ms"
timezone = { minutes_west = 300 }
"#;

fn load_config() -> ClockConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    ClockConfig::from_file(file.path()).unwrap()
}

#[test]
fn test_configured_driver_syncs_periodically() {
    let config = load_config();
    let TimezoneSource::MinutesWest(minutes_west) = config.sync.timezone else {
        panic!("unexpected timezone {:?}", config.sync.timezone);
    };
    let device = &config.device;

    let bus = Arc::new(SimulatedBus::new());
    let clock = Arc::new(FixedClock::new(EPOCH, minutes_west));
    let driver = ClockDriver::init(
        device,
        bus.clone(),
        LatchingPeripheral::new(device.port_base),
        Arc::clone(&clock),
    )
    .unwrap();

    assert_eq!(driver.state(), DriverState::Running);
    assert_eq!(bus.attribute_mode("board_clock", "time"), Some(0o400));
    assert!(bus.is_irq_requested(5));

    let mut ticker = Ticker::new(config.sync.interval);
    {
        let bus = Arc::clone(&bus);
        ticker
            .start(move || {
                bus.raise_irq(5);
            })
            .unwrap();
    }

    // 14:05:09 UTC is 09:05:09 five hours west
    let mut buf = [0u8; 3];
    assert!(wait_until(Duration::from_secs(5), || {
        bus.read_attribute("board_clock", "time", &mut buf).is_ok() && buf == [9, 5, 9]
    }));

    clock.advance(3600 + 55 * 60 + 50);
    assert!(wait_until(Duration::from_secs(5), || {
        bus.read_attribute("board_clock", "time", &mut buf).is_ok() && buf == [11, 0, 59]
    }));

    ticker.stop();
    assert!(ticker.ticks() >= 2);
    assert!(driver.sync_handler().syncs() >= 2);

    driver.teardown().unwrap();
    assert!(!bus.is_driver_registered("board_clock"));
    assert!(!bus.is_irq_requested(5));
    assert_eq!(bus.attribute_count(), 0);
    assert!(matches!(
        bus.read_attribute("board_clock", "time", &mut buf),
        Err(ClockError::NotFound(_))
    ));
}

#[test]
fn test_teardown_order_mirrors_bring_up() {
    let rig = Rig::new(EPOCH);
    let bus = Arc::clone(&rig.bus);
    rig.driver.teardown().unwrap();

    let events = bus.events();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            BusEvent::DriverRegistered(_) => "register",
            BusEvent::FileCreated { .. } => "create_file",
            BusEvent::IrqRequested { .. } => "request_irq",
            BusEvent::IrqFreed { .. } => "free_irq",
            BusEvent::FileRemoved { .. } => "remove_file",
            BusEvent::DriverUnregistered(_) => "unregister",
        })
        .collect();
    assert_eq!(
        kinds,
        [
            "register",
            "create_file",
            "request_irq",
            "free_irq",
            "remove_file",
            "unregister"
        ]
    );
}

#[test]
fn test_failed_irq_request_leaves_host_clean() {
    let config = load_config();
    let bus = Arc::new(SimulatedBus::new());
    bus.fail_next(BusStep::RequestIrq);

    let err = ClockDriver::init(
        &config.device,
        bus.clone(),
        LatchingPeripheral::new(config.device.port_base),
        FixedClock::new(EPOCH, 0),
    )
    .unwrap_err();

    assert!(matches!(err, ClockError::IrqRequest { irq: 5, .. }));
    assert!(!bus.is_driver_registered("board_clock"));
    assert_eq!(bus.attribute_count(), 0);
    assert_eq!(bus.raise_irq(5), IrqReturn::None);

    // The same bus accepts a clean retry.
    let driver = ClockDriver::init(
        &config.device,
        bus.clone(),
        LatchingPeripheral::new(config.device.port_base),
        FixedClock::new(EPOCH, 0),
    )
    .unwrap();
    assert_eq!(bus.raise_irq(5), IrqReturn::Handled);
    driver.teardown().unwrap();
}

#[test]
fn test_denied_port_registers_nothing() {
    let config = load_config();
    let bus = Arc::new(SimulatedBus::new());

    let err = ClockDriver::init(
        &config.device,
        bus.clone(),
        LatchingPeripheral::denying(config.device.port_base),
        FixedClock::new(EPOCH, 0),
    )
    .unwrap_err();

    assert!(matches!(err, ClockError::PortAccess { port: 0x300, .. }));
    assert!(bus.events().is_empty());
}

#[test]
fn test_raw_port_requires_privilege() {
    if is_root() {
        eprintln!("SKIP: running as root, raw port access may succeed");
        return;
    }

    let mut port = RawPort::new(0x233);
    assert!(port.enable().is_err());
    assert!(!port.is_enabled());
}
