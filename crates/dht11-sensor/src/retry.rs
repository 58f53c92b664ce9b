//! Fixed-schedule retries under scoped real-time elevation.

use crate::clock::Clock;
use crate::error::{AcqResult, AcquisitionError};
use crate::frame::DecodedFrame;
use dht11_scheduler::{ElevationConfig, RtElevation, SchedulerControl};
use dht11_watchdog::CancelToken;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Waits between attempts: 2 x 50 ms, 3 x 100 ms, 200/400/800/1600 ms, 3 x 2 s.
pub const BACKOFF_SCHEDULE: [Duration; 12] = [
    Duration::from_millis(50),
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(100),
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(400),
    Duration::from_millis(800),
    Duration::from_millis(1_600),
    Duration::from_millis(2_000),
    Duration::from_millis(2_000),
    Duration::from_millis(2_000),
];

/// Attempts allowed by [`BACKOFF_SCHEDULE`].
pub const MAX_ATTEMPTS: u32 = BACKOFF_SCHEDULE.len() as u32 + 1;

/// Table of waits between attempts; one more attempt than waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    waits: &'static [Duration],
}

impl RetrySchedule {
    /// The DHT11 backoff table.
    pub const DHT11: Self = Self {
        waits: &BACKOFF_SCHEDULE,
    };

    /// Schedule over a custom table.
    #[must_use]
    pub const fn new(waits: &'static [Duration]) -> Self {
        Self { waits }
    }

    /// Waits in order.
    #[must_use]
    pub const fn waits(&self) -> &'static [Duration] {
        self.waits
    }

    /// Attempts this schedule allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        u32::try_from(self.waits.len()).map_or(u32::MAX, |n| n.saturating_add(1))
    }

    /// Sum of all waits.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::DHT11
    }
}

/// A successful read and the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryOutcome {
    /// The verified frame.
    pub frame: DecodedFrame,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Runs read attempts along a [`RetrySchedule`].
#[derive(Debug)]
pub struct RetryController<S, C> {
    scheduler: S,
    clock: C,
    schedule: RetrySchedule,
    elevation: ElevationConfig,
}

impl<S: SchedulerControl, C: Clock> RetryController<S, C> {
    /// Controller with the DHT11 schedule and `SCHED_FIFO` 99 elevation.
    pub fn new(scheduler: S, clock: C) -> Self {
        Self {
            scheduler,
            clock,
            schedule: RetrySchedule::DHT11,
            elevation: ElevationConfig::default(),
        }
    }

    /// Replace the schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Replace the elevation settings.
    #[must_use]
    pub fn with_elevation(mut self, elevation: ElevationConfig) -> Self {
        self.elevation = elevation;
        self
    }

    /// Schedule in use.
    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    /// Scheduler used for elevation.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Run `attempt` until it succeeds, hits a non-retriable error or the
    /// schedule runs out.
    ///
    /// The whole sequence runs under real-time elevation; the previous
    /// scheduling policy is restored before returning.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::AccessDenied`] as soon as it occurs,
    /// [`AcquisitionError::Cancelled`] once `cancel` fires, otherwise
    /// [`AcquisitionError::ReadFailed`] wrapping the last failure.
    pub fn run<F>(&self, cancel: &CancelToken, mut attempt: F) -> AcqResult<RetryOutcome>
    where
        F: FnMut(u32) -> AcqResult<DecodedFrame>,
    {
        let _elevation = RtElevation::acquire(&self.scheduler, &self.elevation);
        let mut waits = self.schedule.waits().iter();
        let mut number = 0_u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AcquisitionError::Cancelled);
            }
            number += 1;

            let error = match attempt(number) {
                Ok(frame) => {
                    if number > 1 {
                        info!(attempt = number, "DHT11 read succeeded after retry");
                    }
                    return Ok(RetryOutcome {
                        frame,
                        humidity: frame.humidity(),
                        temperature: frame.temperature(),
                        attempt: number,
                    });
                }
                Err(e) => e,
            };

            if cancel.is_cancelled() {
                return Err(AcquisitionError::Cancelled);
            }
            if !error.is_retriable() {
                warn!(attempt = number, error = %error, "DHT11 read aborted");
                return Err(error);
            }

            match waits.next() {
                Some(wait) => {
                    debug!(
                        attempt = number,
                        wait_ms = wait.as_millis(),
                        error = %error,
                        "DHT11 read attempt failed, retrying"
                    );
                    self.clock.delay(*wait);
                }
                None => {
                    warn!(attempts = number, error = %error, "DHT11 read attempts exhausted");
                    return Err(AcquisitionError::ReadFailed {
                        attempts: number,
                        last: Box::new(error),
                    });
                }
            }
        }
    }
}
