//! In-memory scheduler that records every request.
//!
//! Used in tests to observe elevation and restoration without privileges.

use crate::elevation::{SavedPolicy, SchedulerControl};
use crate::error::{SchedError, SchedResult};
use crate::rt_setup::ElevationConfig;
use parking_lot::Mutex;

/// Scheduler request observed by [`RecordingScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedEvent {
    /// Elevation granted at the given priority.
    Elevated {
        /// Granted priority.
        priority: i32,
    },
    /// Elevation refused.
    Refused,
    /// Saved policy restored.
    Restored,
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<SchedEvent>,
    elevated: bool,
}

/// Scheduler double that records requests instead of touching the OS.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    refuse: bool,
    state: Mutex<RecordingState>,
}

impl RecordingScheduler {
    /// A scheduler that grants every elevation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler that refuses elevation like an unprivileged process.
    #[must_use]
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            state: Mutex::default(),
        }
    }

    /// All requests seen so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<SchedEvent> {
        self.state.lock().events.clone()
    }

    /// Whether an elevation is currently outstanding.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.state.lock().elevated
    }
}

impl SchedulerControl for RecordingScheduler {
    fn elevate(&self, config: &ElevationConfig) -> SchedResult<SavedPolicy> {
        let mut state = self.state.lock();
        if self.refuse {
            state.events.push(SchedEvent::Refused);
            return Err(SchedError::PermissionDenied);
        }
        state.events.push(SchedEvent::Elevated {
            priority: config.priority,
        });
        state.elevated = true;
        Ok(SavedPolicy::normal())
    }

    fn restore(&self, _saved: &SavedPolicy) -> SchedResult {
        let mut state = self.state.lock();
        state.events.push(SchedEvent::Restored);
        state.elevated = false;
        Ok(())
    }
}
