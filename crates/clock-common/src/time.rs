//! Civil time-of-day sampling.
//!
//! The peripheral only keeps hour, minute and second, so a host instant is
//! reduced to its local time of day. The timezone offset uses the
//! `minutes west of Greenwich` convention of the host kernel, so local time
//! is `epoch - minutes_west * 60`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds in one civil day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Host-observed time of day, decomposed into civil fields.
///
/// Created fresh on every synchronization event and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WallClockSample {
    hour: u8,
    minute: u8,
    second: u8,
}

impl WallClockSample {
    /// Build a sample from civil fields.
    ///
    /// Returns `None` unless `hour < 24`, `minute < 60` and `second < 60`.
    #[must_use]
    pub fn new(hour: u8, minute: u8, second: u8) -> Option<Self> {
        (hour < 24 && minute < 60 && second < 60).then_some(Self {
            hour,
            minute,
            second,
        })
    }

    /// Decompose an epoch-seconds instant into local time of day.
    ///
    /// Instants before the epoch (or pushed before it by the offset) wrap
    /// around to the correct time of day.
    #[must_use]
    pub fn from_epoch(epoch_secs: i64, minutes_west: i32) -> Self {
        let local = epoch_secs - i64::from(minutes_west) * 60;
        let of_day = local.rem_euclid(SECONDS_PER_DAY);

        // of_day < 86_400, every field fits in u8
        Self {
            hour: (of_day / 3600) as u8,
            minute: (of_day % 3600 / 60) as u8,
            second: (of_day % 60) as u8,
        }
    }

    /// Hour, 0-23.
    #[inline]
    #[must_use]
    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute, 0-59.
    #[inline]
    #[must_use]
    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Second, 0-59.
    #[inline]
    #[must_use]
    pub fn second(&self) -> u8 {
        self.second
    }
}

impl fmt::Display for WallClockSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}
