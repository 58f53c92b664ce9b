//! Error types for the watchdog crate.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the watchdog and cancellation machinery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// The acquisition exceeded its ceiling.
    #[error("Watchdog timeout after {0:?} - GPIO operations hung")]
    Timeout(Duration),

    /// The token was cancelled before the hook could be registered.
    #[error("Acquisition cancelled")]
    Cancelled,

    /// Every release hook slot is taken.
    #[error("All {0} release hook slots are in use")]
    HookSlotsExhausted(usize),

    /// The watchdog or signal thread could not be started.
    #[error("Failed to spawn {0} thread")]
    SpawnFailed(&'static str),

    /// Blocking termination signals failed.
    #[error("Failed to configure termination signals: OS error {0}")]
    SignalSetup(i32),
}

impl WatchdogError {
    /// Create a timeout error.
    #[must_use]
    pub fn timeout(ceiling: Duration) -> Self {
        Self::Timeout(ceiling)
    }

    /// Whether the error terminates the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;
