//! Periodic sync signal source.
//!
//! Stands in for the hardware timer that raises the clock interrupt. A
//! dedicated thread calls the tick callback once per interval, measured
//! against absolute deadlines so callback time does not accumulate as drift.

use clock_common::error::{ClockError, ClockResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Thread that fires a callback at a fixed cadence.
#[derive(Debug)]
pub struct Ticker {
    state: Arc<TickerState>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

#[derive(Debug, Default)]
struct TickerState {
    stop_requested: AtomicBool,
    ticks: AtomicU64,
}

impl Ticker {
    /// Create a stopped ticker with the given period.
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::new(TickerState::default()),
            handle: None,
            interval,
        }
    }

    /// Start calling `on_tick` every interval.
    ///
    /// # Errors
    ///
    /// Fails if the ticker is already running, the interval is zero, or the
    /// thread cannot be spawned.
    pub fn start<F>(&mut self, on_tick: F) -> ClockResult<()>
    where
        F: Fn() + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(ClockError::Config("ticker already running".into()));
        }
        if self.interval.is_zero() {
            return Err(ClockError::Config("tick interval must be non-zero".into()));
        }

        info!(interval_ms = self.interval.as_millis(), "Starting sync ticker");
        self.state.stop_requested.store(false, Ordering::Release);

        let state = Arc::clone(&self.state);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("clock-tick".into())
            .spawn(move || {
                debug!("Ticker thread started");
                let mut deadline = Instant::now() + interval;

                while !state.stop_requested.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < deadline {
                        thread::park_timeout(deadline - now);
                        continue;
                    }

                    on_tick();
                    state.ticks.fetch_add(1, Ordering::Relaxed);

                    deadline += interval;
                    let now = Instant::now();
                    if deadline < now {
                        // Missed whole periods; skip them rather than burst
                        let behind = now - deadline;
                        let missed = behind.as_nanos() / interval.as_nanos() + 1;
                        warn!(missed = u64::try_from(missed).unwrap_or(u64::MAX), "Ticker fell behind");
                        deadline = now + interval;
                    }
                }
                debug!("Ticker thread stopped");
            })
            .map_err(|e| ClockError::Config(format!("failed to spawn ticker thread: {e}")))?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.state.stop_requested.store(true, Ordering::Release);
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Ticker thread panicked");
            }
            info!(ticks = self.ticks(), "Sync ticker stopped");
        }
    }

    /// Whether the thread is running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Callbacks fired so far.
    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::Relaxed)
    }

    /// Configured period.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
