//! Real-time elevation configuration.

use crate::DEFAULT_RT_PRIORITY;
use crate::error::{SchedError, SchedResult};

/// Lowest and highest `SCHED_FIFO` priority accepted by Linux.
const PRIORITY_RANGE: core::ops::RangeInclusive<i32> = 1..=99;

/// Real-time elevation configuration.
///
/// Describes what an [`RtElevation`](crate::RtElevation) asks of the scheduler
/// while the guard is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationConfig {
    /// Request a real-time policy at all.
    ///
    /// When disabled the guard is inert and never touches the scheduler.
    pub enabled: bool,

    /// `SCHED_FIFO` priority (1-99 on Linux).
    pub priority: i32,

    /// Lock current and future pages for the duration of the elevation.
    ///
    /// Avoids page faults in the polling loop; needs `CAP_IPC_LOCK` or a
    /// sufficient `RLIMIT_MEMLOCK`.
    pub lock_memory: bool,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: DEFAULT_RT_PRIORITY,
            lock_memory: false,
        }
    }
}

impl ElevationConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that never elevates.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the requested priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set memory locking.
    #[must_use]
    pub fn with_lock_memory(mut self, enabled: bool) -> Self {
        self.lock_memory = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::InvalidPriority`] when the priority falls outside
    /// the real-time range.
    pub fn validate(&self) -> SchedResult {
        if self.enabled && !PRIORITY_RANGE.contains(&self.priority) {
            return Err(SchedError::InvalidPriority(self.priority));
        }
        Ok(())
    }
}
