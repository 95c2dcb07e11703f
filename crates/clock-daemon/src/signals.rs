//! Signal handling for the clock daemon.
//!
//! SIGTERM and SIGINT request shutdown; SIGHUP requests a report of the
//! peripheral's stored time. Handlers only set atomic flags; a poll thread
//! copies them into the shared [`SignalState`] the main loop reads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Signal types that the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM or SIGINT - stop synchronizing and tear down.
    Shutdown,
    /// SIGHUP - log the peripheral's stored time.
    Report,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Shutdown => write!(f, "SIGTERM/SIGINT"),
            SignalKind::Report => write!(f, "SIGHUP"),
        }
    }
}

/// Flags shared between the signal poll thread and the main loop.
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    report_requested: AtomicBool,
    signal_count: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Check if a report has been requested (and clear the flag).
    #[inline]
    pub fn take_report_request(&self) -> bool {
        self.report_requested.swap(false, Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
    }

    /// Request a report (can be called from any thread).
    pub fn request_report(&self) {
        self.report_requested.store(true, Ordering::Relaxed);
    }

    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        debug!(signal = %kind, "Signal recorded");
    }

    /// Get the total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
static REPORT_FLAG: AtomicBool = AtomicBool::new(false);

impl SignalHandler {
    /// Create a signal handler and register process signal handlers.
    ///
    /// On non-Unix platforms only manual shutdown is available.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self {
            state: Arc::new(SignalState::new()),
        };

        #[cfg(unix)]
        handler.register_unix_handlers()?;

        Ok(handler)
    }

    #[cfg(unix)]
    fn register_unix_handlers(&self) -> std::io::Result<()> {
        use std::os::raw::c_int;

        extern "C" fn shutdown_handler(_: c_int) {
            SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
        }

        extern "C" fn report_handler(_: c_int) {
            REPORT_FLAG.store(true, Ordering::Relaxed);
        }

        let state = Arc::clone(&self.state);
        std::thread::Builder::new()
            .name("clock-signals".into())
            .spawn(move || loop {
                if SHUTDOWN_FLAG.swap(false, Ordering::Relaxed) {
                    info!("Shutdown signal received");
                    state.request_shutdown();
                    state.record_signal(SignalKind::Shutdown);
                }
                if REPORT_FLAG.swap(false, Ordering::Relaxed) {
                    state.request_report();
                    state.record_signal(SignalKind::Report);
                }
                if state.shutdown_requested() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            })?;

        let handlers: [(c_int, extern "C" fn(c_int)); 3] = [
            (libc::SIGTERM, shutdown_handler),
            (libc::SIGINT, shutdown_handler),
            (libc::SIGHUP, report_handler),
        ];
        for (signum, handler) in handlers {
            // SAFETY: the handlers only store to static atomics.
            let previous = unsafe { libc::signal(signum, handler as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Check if a report has been requested (clears the flag).
    #[inline]
    pub fn take_report_request(&self) -> bool {
        self.state.take_report_request()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request_shutdown();
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}

/// Block until shutdown is requested or `timeout` expires.
///
/// Returns `true` if shutdown was signaled.
pub fn wait_for_shutdown(handler: &SignalHandler, timeout: Duration) -> bool {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(20);

    while start.elapsed() < timeout {
        if handler.shutdown_requested() {
            return true;
        }
        std::thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
    }

    handler.shutdown_requested()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_state_default() {
        let state = SignalState::new();
        assert!(!state.shutdown_requested());
        assert!(!state.take_report_request());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_report_request_clears() {
        let state = SignalState::new();
        state.request_report();
        assert!(state.take_report_request());
        assert!(!state.take_report_request());
    }

    #[test]
    fn test_manual_shutdown_ends_wait() {
        let handler = SignalHandler::new().unwrap();
        assert!(!wait_for_shutdown(&handler, Duration::from_millis(30)));

        handler.request_shutdown();
        assert!(handler.shutdown_requested());
        assert!(wait_for_shutdown(&handler, Duration::from_secs(1)));
    }
}
