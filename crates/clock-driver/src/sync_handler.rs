//! Write path: copy host time into the peripheral on every sync signal.
//!
//! Each invocation walks `Idle → Sampling → Writing → Idle`. Sampling and
//! the timezone conversion happen before the port lock is taken; the locked
//! section is exactly three `outb` operations and never allocates or logs.

use crate::clock::HostClock;
use crate::codec::{encode_write, RegisterField};
use crate::context::ClockContext;
use crate::host::{IrqHandler, IrqReturn};
use crate::port::PortIo;
use clock_common::time::WallClockSample;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Progress of the handler through one synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncPhase {
    /// Waiting for the next signal.
    Idle = 0,
    /// Reading and converting host time.
    Sampling = 1,
    /// Holding the port lock, emitting write commands.
    Writing = 2,
}

impl SyncPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Sampling,
            2 => Self::Writing,
            _ => Self::Idle,
        }
    }
}

/// Interrupt handler that synchronizes the peripheral with host time.
pub struct ClockSyncHandler<P, C> {
    context: Arc<ClockContext<P>>,
    clock: C,
    irq: u32,
    phase: AtomicU8,
    syncs: AtomicU64,
    misrouted: AtomicU64,
}

impl<P: PortIo, C: HostClock> ClockSyncHandler<P, C> {
    /// Handler for signal `irq`, sampling `clock`.
    pub fn new(context: Arc<ClockContext<P>>, clock: C, irq: u32) -> Self {
        Self {
            context,
            clock,
            irq,
            phase: AtomicU8::new(SyncPhase::Idle as u8),
            syncs: AtomicU64::new(0),
            misrouted: AtomicU64::new(0),
        }
    }

    /// Service one sync signal.
    ///
    /// Signals other than the handler's own line are left for other
    /// consumers and cause no port activity.
    pub fn on_signal(&self, irq: u32) -> IrqReturn {
        if irq != self.irq {
            self.misrouted.fetch_add(1, Ordering::Relaxed);
            trace!(irq, expected = self.irq, "Ignoring foreign interrupt");
            return IrqReturn::None;
        }

        self.set_phase(SyncPhase::Sampling);
        let sample = self.clock.sample();

        self.set_phase(SyncPhase::Writing);
        write_sample(&self.context, sample);

        self.set_phase(SyncPhase::Idle);
        self.syncs.fetch_add(1, Ordering::Relaxed);
        trace!(%sample, "Peripheral clock synchronized");
        IrqReturn::Handled
    }

    /// Interrupt line this handler owns.
    pub fn irq(&self) -> u32 {
        self.irq
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Completed synchronizations.
    pub fn syncs(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    /// Signals rejected as belonging to another line.
    pub fn misrouted(&self) -> u64 {
        self.misrouted.load(Ordering::Relaxed)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl<P: PortIo, C: HostClock> IrqHandler for ClockSyncHandler<P, C> {
    fn handle(&self, irq: u32) -> IrqReturn {
        self.on_signal(irq)
    }
}

impl<P, C> std::fmt::Debug for ClockSyncHandler<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockSyncHandler")
            .field("irq", &self.irq)
            .field("syncs", &self.syncs.load(Ordering::Relaxed))
            .field("misrouted", &self.misrouted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Latch `sample` into the peripheral: hour, minute, then second.
pub fn write_sample<P: PortIo>(context: &ClockContext<P>, sample: WallClockSample) {
    let hour = encode_write(RegisterField::Hour, sample.hour());
    let minute = encode_write(RegisterField::Minute, sample.minute());
    let second = encode_write(RegisterField::Second, sample.second());

    let mut port = context.lock();
    port.outb(hour.bits());
    port.outb(minute.bits());
    port.outb(second.bits());
}
