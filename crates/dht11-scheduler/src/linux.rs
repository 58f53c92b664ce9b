//! Linux implementation on top of `sched_setscheduler(2)`.

#![allow(unsafe_code, reason = "libc scheduling calls have no safe wrapper")]

use crate::elevation::{SavedPolicy, SchedulerControl};
use crate::error::{SchedError, SchedResult};
use crate::rt_setup::ElevationConfig;
use libc::{
    MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall, munlockall, sched_get_priority_max,
    sched_get_priority_min, sched_getparam, sched_getscheduler, sched_param, sched_setscheduler,
};
use tracing::warn;

/// Scheduler control for the calling thread via POSIX scheduling calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixScheduler;

impl PosixScheduler {
    /// Create new platform scheduler instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn last_error() -> SchedError {
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => SchedError::PermissionDenied,
        Some(code) => SchedError::Os(code),
        None => SchedError::Os(0),
    }
}

impl SchedulerControl for PosixScheduler {
    fn elevate(&self, config: &ElevationConfig) -> SchedResult<SavedPolicy> {
        // SAFETY: pid 0 addresses the calling thread; the call only reads state.
        let policy = unsafe { sched_getscheduler(0) };
        if policy < 0 {
            return Err(last_error());
        }

        let mut current = sched_param { sched_priority: 0 };
        // SAFETY: `current` is a valid, writable sched_param for the duration of the call.
        if unsafe { sched_getparam(0, &mut current) } != 0 {
            return Err(last_error());
        }

        // SAFETY: pure query of the policy's lower priority bound.
        let min = unsafe { sched_get_priority_min(SCHED_FIFO) };
        // SAFETY: pure query of the policy's upper priority bound.
        let max = unsafe { sched_get_priority_max(SCHED_FIFO) };
        if config.priority < min || config.priority > max {
            return Err(SchedError::InvalidPriority(config.priority));
        }

        let rt = sched_param {
            sched_priority: config.priority,
        };
        // SAFETY: `rt` outlives the call and holds a priority inside the FIFO range.
        if unsafe { sched_setscheduler(0, SCHED_FIFO, &rt) } != 0 {
            return Err(last_error());
        }

        let mut memory_locked = false;
        if config.lock_memory {
            // SAFETY: mlockall takes only flags.
            if unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) } == 0 {
                memory_locked = true;
            } else {
                warn!(error = %last_error(), "mlockall failed, continuing without locked memory");
            }
        }

        Ok(SavedPolicy {
            policy,
            priority: current.sched_priority,
            memory_locked,
        })
    }

    fn restore(&self, saved: &SavedPolicy) -> SchedResult {
        if saved.memory_locked {
            // SAFETY: munlockall takes no arguments.
            unsafe {
                munlockall();
            }
        }

        let param = sched_param {
            sched_priority: saved.priority,
        };
        // SAFETY: `param` outlives the call; policy and priority were read back from the kernel.
        if unsafe { sched_setscheduler(0, saved.policy, &param) } != 0 {
            return Err(last_error());
        }
        Ok(())
    }
}
