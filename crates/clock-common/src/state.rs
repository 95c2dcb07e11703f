//! Driver lifecycle state machine.
//!
//! State transitions follow the registration order of the driver:
//! UNLOADED → REGISTERED → PUBLISHED → RUNNING → TEARING_DOWN → UNLOADED
//!
//! Any partially initialized state may fall back to UNLOADED when a later
//! registration step fails and the earlier steps are rolled back.

use crate::error::{ClockError, ClockResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of the clock driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverState {
    /// Nothing registered with the host.
    #[default]
    Unloaded,
    /// Driver registered with the device model.
    Registered,
    /// Query attribute visible to readers.
    Published,
    /// Interrupt line subscribed; synchronization active.
    Running,
    /// Teardown in progress; no new triggers are delivered.
    TearingDown,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => write!(f, "UNLOADED"),
            Self::Registered => write!(f, "REGISTERED"),
            Self::Published => write!(f, "PUBLISHED"),
            Self::Running => write!(f, "RUNNING"),
            Self::TearingDown => write!(f, "TEARING_DOWN"),
        }
    }
}

impl DriverState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: DriverState) -> bool {
        use DriverState::{Published, Registered, Running, TearingDown, Unloaded};

        matches!(
            (self, target),
            // Init, in registration order
            (Unloaded, Registered)
                | (Registered, Published)
                | (Published, Running)
                // Rollback after a failed init step
                | (Registered, Unloaded)
                | (Published, Unloaded)
                // Teardown
                | (Running, TearingDown)
                | (TearingDown, Unloaded)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: DriverState) -> ClockResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(ClockError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Returns true while the read path is reachable by the host.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Published | Self::Running)
    }
}
