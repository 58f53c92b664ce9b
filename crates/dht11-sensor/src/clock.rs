//! Time sources for protocol timing.
//!
//! The decoder measures pulse widths in microseconds against a monotonic
//! clock and never reads wall time for timing. Wall time is only used to stamp
//! measurements.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Below this, [`MonotonicClock::delay`] spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(100);

/// Injected time source.
pub trait Clock {
    /// Microseconds elapsed on a monotonic timeline.
    fn now_us(&self) -> u64;

    /// Block for `duration`.
    fn delay(&self, duration: Duration);

    /// Current wall-clock time.
    fn wall_time(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }

    fn delay(&self, duration: Duration) {
        (**self).delay(duration);
    }

    fn wall_time(&self) -> DateTime<Utc> {
        (**self).wall_time()
    }
}

/// [`Instant`]-backed clock for real hardware.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose timeline starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn delay(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        if duration > SPIN_THRESHOLD {
            std::thread::sleep(duration.saturating_sub(SPIN_THRESHOLD));
        }
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
struct VirtualState {
    now_us: AtomicU64,
    wall_origin: Mutex<DateTime<Utc>>,
    delays: Mutex<Vec<Duration>>,
}

/// Deterministic clock for simulation.
///
/// Time only moves when [`advance`](Self::advance) or
/// [`delay`](Clock::delay) is called. Clones share one timeline. Wall time is
/// the pinned origin plus the elapsed virtual time.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    state: Arc<VirtualState>,
}

impl VirtualClock {
    /// Create a clock at t = 0 with wall time pinned to the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self::with_wall_time(Utc::now())
    }

    /// Create a clock at t = 0 with the given wall-clock origin.
    #[must_use]
    pub fn with_wall_time(origin: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(VirtualState {
                now_us: AtomicU64::new(0),
                wall_origin: Mutex::new(origin),
                delays: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Move virtual time forward without recording a delay.
    pub fn advance(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.state.now_us.fetch_add(micros, Ordering::SeqCst);
    }

    /// Every duration passed to `delay`, in call order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.state.delays.lock().clone()
    }

    /// Sum of recorded delays of at least `min` (filters out protocol waits).
    #[must_use]
    pub fn total_delay_at_least(&self, min: Duration) -> Duration {
        self.state
            .delays
            .lock()
            .iter()
            .filter(|d| **d >= min)
            .sum()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now_us(&self) -> u64 {
        self.state.now_us.load(Ordering::SeqCst)
    }

    fn delay(&self, duration: Duration) {
        self.state.delays.lock().push(duration);
        self.advance(duration);
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::microseconds(
            i64::try_from(self.now_us()).unwrap_or(i64::MAX),
        );
        *self.state.wall_origin.lock() + elapsed
    }
}
