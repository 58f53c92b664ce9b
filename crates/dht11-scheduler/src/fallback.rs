//! Fallback for platforms without POSIX real-time scheduling support.

use crate::elevation::{SavedPolicy, SchedulerControl};
use crate::error::{SchedError, SchedResult};
use crate::rt_setup::ElevationConfig;

/// Scheduler control that always reports real-time scheduling as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixScheduler;

impl PosixScheduler {
    /// Create new platform scheduler instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SchedulerControl for PosixScheduler {
    fn elevate(&self, _config: &ElevationConfig) -> SchedResult<SavedPolicy> {
        Err(SchedError::Unsupported)
    }

    fn restore(&self, _saved: &SavedPolicy) -> SchedResult {
        Ok(())
    }
}
