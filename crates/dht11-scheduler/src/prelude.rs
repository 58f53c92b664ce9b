//! Prelude module for common scheduler types.

pub use crate::elevation::{RtElevation, SavedPolicy, SchedulerControl};
pub use crate::error::{SchedError, SchedResult};
pub use crate::recording::{RecordingScheduler, SchedEvent};
pub use crate::rt_setup::ElevationConfig;
pub use crate::{DEFAULT_RT_PRIORITY, PosixScheduler};
