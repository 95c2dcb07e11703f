//! Common utilities for integration tests.
//!
//! Provides helpers for:
//! - Building a driver over an instrumented port
//! - Splitting a port journal into transactions
//! - Polling for asynchronous progress

#![allow(dead_code)]

use clock_common::config::DeviceConfig;
use clock_driver::codec::{decode_select, decode_write, RegisterField};
use clock_driver::simulated::{PortJournal, PortOp, RecordingPort, SimulatedBus};
use clock_driver::{ClockDriver, CommandByte, FixedClock};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 2021-01-01T14:05:09Z.
pub const EPOCH: i64 = 1_609_509_909;

/// Driver wired to a recording port, a fixed clock and a fresh bus.
pub struct Rig {
    pub bus: Arc<SimulatedBus>,
    pub clock: Arc<FixedClock>,
    pub journal: PortJournal,
    pub driver: ClockDriver<RecordingPort, Arc<FixedClock>>,
}

impl Rig {
    /// Bring up the default device with the clock at `epoch` UTC.
    pub fn new(epoch: i64) -> Self {
        Self::with_device(DeviceConfig::default(), epoch)
    }

    /// Bring up `device` with the clock at `epoch` UTC.
    pub fn with_device(device: DeviceConfig, epoch: i64) -> Self {
        let bus = Arc::new(SimulatedBus::new());
        let clock = Arc::new(FixedClock::new(epoch, 0));
        let (port, journal) = RecordingPort::new(device.port_base);
        let driver = ClockDriver::init(&device, bus.clone(), port, Arc::clone(&clock))
            .expect("driver init");
        Self {
            bus,
            clock,
            journal,
            driver,
        }
    }

    /// Read the attribute the way a host query does.
    pub fn query(&self) -> [u8; 3] {
        let device = self.driver.device();
        let mut buf = [0u8; 3];
        let n = self
            .bus
            .read_attribute(&device.name, &device.attribute, &mut buf)
            .expect("attribute read");
        assert_eq!(n, 3);
        buf
    }
}

/// A complete port transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    /// Three write commands, decoded to hour, minute and second.
    Write([u8; 3]),
    /// Three select/read pairs, with the values read back.
    Read([u8; 3]),
}

/// Split a journal into transactions.
///
/// Fails with a description of the first operation that does not continue
/// the transaction in progress.
pub fn split_transactions(ops: &[PortOp]) -> Result<Vec<Transaction>, String> {
    let mut transactions = Vec::new();
    let mut rest = ops;

    while let Some(first) = rest.first() {
        match *first {
            PortOp::Out(byte) if CommandByte(byte).is_write() => {
                let values = decode_write_frame(rest)?;
                transactions.push(Transaction::Write(values));
                rest = &rest[3..];
            }
            PortOp::Out(_) => {
                let values = decode_read_frame(rest)?;
                transactions.push(Transaction::Read(values));
                rest = &rest[6..];
            }
            PortOp::In(value) => {
                return Err(format!(
                    "read of {value:#04x} outside a transaction at op {}",
                    ops.len() - rest.len()
                ));
            }
        }
    }

    Ok(transactions)
}

fn decode_write_frame(ops: &[PortOp]) -> Result<[u8; 3], String> {
    let mut values = [0u8; 3];
    for field in RegisterField::ALL {
        let op = ops.get(field.index());
        let value = match op {
            Some(PortOp::Out(byte)) => decode_write(field, CommandByte(*byte)),
            _ => None,
        };
        values[field.index()] =
            value.ok_or_else(|| format!("expected {field:?} write, found {op:?}"))?;
    }
    Ok(values)
}

fn decode_read_frame(ops: &[PortOp]) -> Result<[u8; 3], String> {
    let mut values = [0u8; 3];
    for field in RegisterField::ALL {
        let select = ops.get(field.index() * 2);
        let selected = match select {
            Some(PortOp::Out(byte)) => decode_select(CommandByte(*byte)),
            _ => None,
        };
        if selected != Some(field) {
            return Err(format!("expected {field:?} select, found {select:?}"));
        }
        match ops.get(field.index() * 2 + 1) {
            Some(PortOp::In(value)) => values[field.index()] = *value,
            other => return Err(format!("expected {field:?} read, found {other:?}")),
        }
    }
    Ok(values)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Check if running as root (required for raw port access).
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[test]
fn test_split_accepts_well_formed_journal() {
    let ops = [
        PortOp::Out(0x8E),
        PortOp::Out(0xA5),
        PortOp::Out(0xC9),
        PortOp::Out(0x00),
        PortOp::In(14),
        PortOp::Out(0x20),
        PortOp::In(5),
        PortOp::Out(0x40),
        PortOp::In(9),
    ];
    let transactions = split_transactions(&ops).unwrap();
    assert_eq!(
        transactions,
        vec![Transaction::Write([14, 5, 9]), Transaction::Read([14, 5, 9])]
    );
}

#[test]
fn test_split_rejects_interleaving() {
    let ops = [
        PortOp::Out(0x8E),
        PortOp::Out(0x00),
        PortOp::Out(0xA5),
        PortOp::Out(0xC9),
    ];
    assert!(split_transactions(&ops).is_err());

    let ops = [PortOp::Out(0x00), PortOp::Out(0x8E), PortOp::In(14)];
    assert!(split_transactions(&ops).is_err());
}
