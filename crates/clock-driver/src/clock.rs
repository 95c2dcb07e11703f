//! Host wall-clock sources.

use clock_common::config::TimezoneSource;
use clock_common::time::WallClockSample;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of host time for the sync handler.
pub trait HostClock: Send + Sync {
    /// Current time as seconds since the Unix epoch.
    fn now_epoch_secs(&self) -> i64;

    /// Local timezone offset in minutes west of Greenwich at `epoch_secs`.
    fn minutes_west(&self, epoch_secs: i64) -> i32;

    /// Sample host time and reduce it to local time of day.
    fn sample(&self) -> WallClockSample {
        let now = self.now_epoch_secs();
        WallClockSample::from_epoch(now, self.minutes_west(now))
    }
}

/// Realtime clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: TimezoneSource,
}

impl SystemClock {
    /// Create a clock using `timezone` for the local offset.
    pub fn new(timezone: TimezoneSource) -> Self {
        Self { timezone }
    }
}

impl HostClock for SystemClock {
    #[cfg(unix)]
    fn now_epoch_secs(&self) -> i64 {
        use nix::time::{clock_gettime, ClockId};

        match clock_gettime(ClockId::CLOCK_REALTIME) {
            #[allow(clippy::useless_conversion)] // time_t is i32 on some targets
            Ok(ts) => i64::from(ts.tv_sec()),
            Err(_) => std_epoch_secs(),
        }
    }

    #[cfg(not(unix))]
    fn now_epoch_secs(&self) -> i64 {
        std_epoch_secs()
    }

    fn minutes_west(&self, epoch_secs: i64) -> i32 {
        match self.timezone {
            TimezoneSource::Host => host_minutes_west(epoch_secs),
            TimezoneSource::Utc => 0,
            TimezoneSource::MinutesWest(minutes) => minutes,
        }
    }
}

fn std_epoch_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

/// Offset of the host's local timezone, from `localtime_r`.
#[cfg(unix)]
fn host_minutes_west(epoch_secs: i64) -> i32 {
    let Ok(t) = libc::time_t::try_from(epoch_secs) else {
        return 0;
    };
    // SAFETY: tm is plain old data; localtime_r writes it fully on success.
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    // SAFETY: both pointers are valid for the duration of the call.
    let res = unsafe { libc::localtime_r(&t, &mut tm) };
    if res.is_null() {
        return 0;
    }
    i32::try_from(-tm.tm_gmtoff / 60).unwrap_or(0)
}

#[cfg(not(unix))]
fn host_minutes_west(_epoch_secs: i64) -> i32 {
    0
}

/// Manually driven clock for tests and simulation.
#[derive(Debug)]
pub struct FixedClock {
    epoch_secs: AtomicI64,
    minutes_west: i32,
}

impl FixedClock {
    /// Clock frozen at `epoch_secs` with a fixed offset.
    pub fn new(epoch_secs: i64, minutes_west: i32) -> Self {
        Self {
            epoch_secs: AtomicI64::new(epoch_secs),
            minutes_west,
        }
    }

    /// Jump to `epoch_secs`.
    pub fn set(&self, epoch_secs: i64) {
        self.epoch_secs.store(epoch_secs, Ordering::Relaxed);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.epoch_secs.fetch_add(secs, Ordering::Relaxed);
    }
}

impl HostClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.epoch_secs.load(Ordering::Relaxed)
    }

    fn minutes_west(&self, _epoch_secs: i64) -> i32 {
        self.minutes_west
    }
}

impl<C: HostClock + ?Sized> HostClock for std::sync::Arc<C> {
    fn now_epoch_secs(&self) -> i64 {
        (**self).now_epoch_secs()
    }

    fn minutes_west(&self, epoch_secs: i64) -> i32 {
        (**self).minutes_west(epoch_secs)
    }
}
