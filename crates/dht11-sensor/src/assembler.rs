//! One reading per sensor: live, cached or unavailable.

use crate::cache::{CacheRecord, ReadingCache};
use crate::clock::Clock;
use crate::decoder::{ProtocolTiming, PulseDecoder};
use crate::error::{AcqResult, AcquisitionError};
use crate::gpio::{DEFAULT_CHIP_PATH, GpioChip, GpioPin, LineAddress};
use crate::reading::{Acquisition, Measurement, SensorReading};
use crate::retry::{RetryController, RetrySchedule};
use dht11_scheduler::{ElevationConfig, SchedulerControl};
use dht11_watchdog::CancelToken;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug_span, info, warn};

/// Tunables for a [`ReadingAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// GPIO chip the data line lives on.
    pub chip_path: PathBuf,
    /// Protocol timing.
    pub timing: ProtocolTiming,
    /// Retry waits.
    pub schedule: RetrySchedule,
    /// Real-time elevation during the attempt sequence.
    pub elevation: ElevationConfig,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            chip_path: PathBuf::from(DEFAULT_CHIP_PATH),
            timing: ProtocolTiming::DHT11,
            schedule: RetrySchedule::DHT11,
            elevation: ElevationConfig::default(),
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> AcqResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_idle| Self(flag))
            .map_err(|_busy| AcquisitionError::request_failed("acquisition already in progress"))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Produces [`Acquisition`]s, feeding and falling back to the reading cache.
///
/// Acquisitions are serialized; a concurrent call fails fast instead of
/// waiting for the line.
pub struct ReadingAssembler<G, S, C> {
    chip: G,
    decoder: PulseDecoder<C>,
    retry: RetryController<S, C>,
    clock: C,
    cache: ReadingCache,
    cancel: CancelToken,
    chip_path: PathBuf,
    in_flight: AtomicBool,
}

impl<G, S, C> ReadingAssembler<G, S, C>
where
    G: GpioChip,
    S: SchedulerControl,
    C: Clock + Clone,
{
    /// Assembler with default timing, schedule, elevation and cache root.
    pub fn new(chip: G, scheduler: S, clock: C) -> Self {
        Self::with_config(chip, scheduler, clock, AssemblerConfig::default())
    }

    /// Assembler with explicit tunables.
    pub fn with_config(chip: G, scheduler: S, clock: C, config: AssemblerConfig) -> Self {
        Self {
            chip,
            decoder: PulseDecoder::with_timing(clock.clone(), config.timing),
            retry: RetryController::new(scheduler, clock.clone())
                .with_schedule(config.schedule)
                .with_elevation(config.elevation),
            clock,
            cache: ReadingCache::default(),
            cancel: CancelToken::new(),
            chip_path: config.chip_path,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Use `cache` instead of the default root.
    #[must_use]
    pub fn with_cache(mut self, cache: ReadingCache) -> Self {
        self.cache = cache;
        self
    }

    /// Share an existing cancellation context (watchdog, signal listener).
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancellation context of every acquisition made by this assembler.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The reading cache.
    pub fn cache(&self) -> &ReadingCache {
        &self.cache
    }

    /// The GPIO backend.
    pub fn chip(&self) -> &G {
        &self.chip
    }

    /// Clock driving line timing and reading timestamps.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Scheduler used for elevation.
    pub fn scheduler(&self) -> &S {
        self.retry.scheduler()
    }

    /// Live read only: retry along the schedule and cache a success.
    ///
    /// # Errors
    ///
    /// The terminal [`AcquisitionError`] of the attempt sequence, or
    /// [`AcquisitionError::RequestFailed`] when another acquisition is running.
    pub fn acquire_live(&self, pin: GpioPin, sensor_index: usize) -> AcqResult<Measurement> {
        let _in_flight = InFlight::enter(&self.in_flight)?;
        self.read_live(pin, sensor_index)
    }

    /// Read `pin`, falling back to the cached reading of `sensor_index`.
    pub fn acquire(&self, pin: GpioPin, sensor_index: usize) -> Acquisition {
        let _in_flight = match InFlight::enter(&self.in_flight) {
            Ok(guard) => guard,
            Err(e) => return Acquisition::Unavailable(e),
        };
        match self.read_live(pin, sensor_index) {
            Ok(measurement) => Acquisition::Fresh(measurement),
            Err(e) => self.fall_back(sensor_index, e),
        }
    }

    /// [`acquire`](Self::acquire), flattened.
    pub fn acquire_reading(&self, pin: GpioPin, sensor_index: usize) -> SensorReading {
        self.acquire(pin, sensor_index).to_reading()
    }

    fn read_live(&self, pin: GpioPin, sensor_index: usize) -> AcqResult<Measurement> {
        let _span = debug_span!("acquire", sensor = sensor_index, %pin).entered();

        let address = LineAddress::new(self.chip_path.clone(), u32::from(pin.bcm()));
        let outcome = self.retry.run(&self.cancel, |_attempt| {
            self.decoder.read_frame(&self.chip, &address, &self.cancel)
        })?;

        let measurement = Measurement {
            temperature: outcome.temperature,
            humidity: outcome.humidity,
            timestamp: self.clock.wall_time(),
        };
        info!(
            sensor = sensor_index,
            temperature = measurement.temperature,
            humidity = measurement.humidity,
            attempt = outcome.attempt,
            "DHT11 reading"
        );

        let record = CacheRecord::new(measurement.temperature, measurement.humidity, measurement.timestamp);
        if let Err(e) = self.cache.record(sensor_index, &record) {
            warn!(sensor = sensor_index, error = %e, "Failed to cache reading");
        }
        Ok(measurement)
    }

    fn fall_back(&self, sensor_index: usize, error: AcquisitionError) -> Acquisition {
        let Some(cached) = self.cache.lookup_at(sensor_index, self.clock.wall_time()) else {
            warn!(sensor = sensor_index, error = %error, "DHT11 read failed, no cached data");
            return Acquisition::Unavailable(error);
        };

        let age_secs = cached.age.as_secs();
        warn!(
            sensor = sensor_index,
            age_secs,
            error = %error,
            "Live read failed, serving cached data"
        );
        Acquisition::Degraded {
            measurement: Measurement {
                temperature: cached.record.temperature,
                humidity: cached.record.humidity,
                timestamp: cached.record.captured_at,
            },
            note: format!(
                "live read failed, using cached data for sensor{sensor_index} (age {age_secs}s)"
            ),
            age: cached.age,
        }
    }
}

impl<G, S, C> std::fmt::Debug for ReadingAssembler<G, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingAssembler")
            .field("chip_path", &self.chip_path)
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
