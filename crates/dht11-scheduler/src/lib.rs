//! Scoped real-time scheduling elevation.
//!
//! Bit-banging a single-wire sensor means busy-polling a GPIO line with
//! microsecond resolution. Being preempted in the middle of a frame corrupts
//! the pulse measurements, so callers bracket the timing-critical section with
//! an [`RtElevation`] guard:
//!
//! - **Elevation is best-effort**: failing to obtain `SCHED_FIFO` (usually a
//!   missing `CAP_SYS_NICE`) is logged and the caller proceeds at normal
//!   priority.
//! - **Restoration is guaranteed**: the previous policy is restored when the
//!   guard drops, on every exit path including unwinding.
//! - **Platform access sits behind [`SchedulerControl`]** so the elevation
//!   logic can be exercised with [`RecordingScheduler`].
//!
//! # Example
//!
//! ```
//! use dht11_scheduler::{ElevationConfig, RecordingScheduler, RtElevation};
//!
//! let scheduler = RecordingScheduler::new();
//! {
//!     let guard = RtElevation::acquire(&scheduler, &ElevationConfig::default());
//!     assert!(guard.is_elevated());
//!     // timing-critical work
//! }
//! assert!(!scheduler.is_elevated());
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod elevation;
pub mod error;
pub mod recording;
pub mod rt_setup;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(target_os = "linux"))]
mod fallback;

pub mod prelude;

pub use elevation::{RtElevation, SavedPolicy, SchedulerControl};
pub use error::{SchedError, SchedResult};
pub use recording::{RecordingScheduler, SchedEvent};
pub use rt_setup::ElevationConfig;

#[cfg(target_os = "linux")]
pub use linux::PosixScheduler;

#[cfg(not(target_os = "linux"))]
pub use fallback::PosixScheduler;

/// `SCHED_FIFO` priority requested by default (the top of the Linux range).
pub const DEFAULT_RT_PRIORITY: i32 = 99;
