//! Scoped elevation guard.

use crate::error::SchedResult;
use crate::rt_setup::ElevationConfig;
use tracing::{debug, warn};

/// Scheduling state captured before elevation, handed back on restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedPolicy {
    /// Raw OS policy identifier (`SCHED_OTHER`, `SCHED_FIFO`, ...).
    pub policy: i32,
    /// Static priority under that policy.
    pub priority: i32,
    /// Whether elevation locked memory that must be unlocked again.
    pub memory_locked: bool,
}

impl SavedPolicy {
    /// The normal time-sharing state (`SCHED_OTHER`, priority 0).
    #[must_use]
    pub const fn normal() -> Self {
        Self {
            policy: 0,
            priority: 0,
            memory_locked: false,
        }
    }
}

/// Platform access for switching the calling thread's scheduling class.
pub trait SchedulerControl {
    /// Switch the calling thread to a real-time policy.
    ///
    /// Returns the state to hand back to [`restore`](Self::restore).
    ///
    /// # Errors
    ///
    /// Returns an error when the policy change is refused.
    fn elevate(&self, config: &ElevationConfig) -> SchedResult<SavedPolicy>;

    /// Return the calling thread to a previously saved state.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS rejects the change.
    fn restore(&self, saved: &SavedPolicy) -> SchedResult;
}

impl<S: SchedulerControl + ?Sized> SchedulerControl for &S {
    fn elevate(&self, config: &ElevationConfig) -> SchedResult<SavedPolicy> {
        (**self).elevate(config)
    }

    fn restore(&self, saved: &SavedPolicy) -> SchedResult {
        (**self).restore(saved)
    }
}

/// Real-time elevation held for the lifetime of the guard.
///
/// Acquisition never fails: when the scheduler refuses, the guard is simply
/// not elevated. Dropping the guard restores the saved policy.
#[must_use = "elevation ends as soon as the guard is dropped"]
pub struct RtElevation<'a, S: SchedulerControl + ?Sized> {
    scheduler: &'a S,
    saved: Option<SavedPolicy>,
}

impl<'a, S: SchedulerControl + ?Sized> RtElevation<'a, S> {
    /// Request elevation according to `config`.
    pub fn acquire(scheduler: &'a S, config: &ElevationConfig) -> Self {
        if !config.enabled {
            return Self {
                scheduler,
                saved: None,
            };
        }

        if let Err(e) = config.validate() {
            warn!(error = %e, "Ignoring invalid real-time elevation config");
            return Self {
                scheduler,
                saved: None,
            };
        }

        let saved = match scheduler.elevate(config) {
            Ok(saved) => {
                debug!(priority = config.priority, "Real-time scheduling elevated");
                Some(saved)
            }
            Err(e) => {
                warn!(error = %e, "Real-time elevation unavailable, continuing at normal priority");
                None
            }
        };

        Self { scheduler, saved }
    }

    /// Whether the scheduler accepted the elevation.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.saved.is_some()
    }

    /// Restore the saved policy now instead of at drop.
    pub fn release(mut self) {
        self.restore_saved();
    }

    fn restore_saved(&mut self) {
        if let Some(saved) = self.saved.take() {
            match self.scheduler.restore(&saved) {
                Ok(()) => debug!(policy = saved.policy, "Scheduling policy restored"),
                Err(e) => warn!(error = %e, "Failed to restore scheduling policy"),
            }
        }
    }
}

impl<S: SchedulerControl + ?Sized> Drop for RtElevation<'_, S> {
    fn drop(&mut self) {
        self.restore_saved();
    }
}

impl<S: SchedulerControl + ?Sized> core::fmt::Debug for RtElevation<'_, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RtElevation")
            .field("saved", &self.saved)
            .finish_non_exhaustive()
    }
}
