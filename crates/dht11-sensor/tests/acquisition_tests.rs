//! End-to-end acquisition scenarios against the simulated sensor.

use chrono::{DateTime, TimeZone, Utc};
use dht11_scheduler::{RecordingScheduler, SchedEvent};
use dht11_sensor::gpio::sim::ZERO_BIT_US;
use dht11_sensor::prelude::*;
use dht11_sensor::retry::BACKOFF_SCHEDULE;
use dht11_sensor::{AcquisitionError, ResponseEdge};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const KNOWN_FRAME: [u8; 5] = [0x23, 0x00, 0x17, 0x00, 0x3A];

fn origin() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_default()
}

struct Rig {
    clock: VirtualClock,
    chip: SimulatedChip,
    cache_dir: TempDir,
}

impl Rig {
    fn new(configure: impl FnOnce(SimulatedChip) -> SimulatedChip) -> Result<Self, std::io::Error> {
        let clock = VirtualClock::with_wall_time(origin());
        let chip = configure(SimulatedChip::new(clock.clone()));
        Ok(Self {
            clock,
            chip,
            cache_dir: TempDir::new()?,
        })
    }

    fn cache(&self) -> ReadingCache {
        ReadingCache::new(self.cache_dir.path())
    }

    fn assembler(&self) -> ReadingAssembler<SimulatedChip, RecordingScheduler, VirtualClock> {
        ReadingAssembler::new(self.chip.clone(), RecordingScheduler::new(), self.clock.clone())
            .with_cache(self.cache())
    }

    fn retry_waits(&self) -> Duration {
        self.clock.total_delay_at_least(Duration::from_millis(50))
    }
}

#[test]
fn known_frame_decodes_to_35_percent_and_23_degrees() -> TestResult {
    let rig = Rig::new(|chip| chip.with_waveform(Waveform::dht11(KNOWN_FRAME)))?;
    let assembler = rig.assembler();

    let acquisition = assembler.acquire(GpioPin::DEFAULT, 0);
    let Acquisition::Fresh(measurement) = acquisition else {
        panic!("expected a fresh reading, got {acquisition:?}");
    };
    assert!((measurement.humidity - 35.0).abs() < f32::EPSILON);
    assert!((measurement.temperature - 23.0).abs() < f32::EPSILON);
    assert_eq!(rig.chip.opens(), 1);
    assert!(!rig.chip.is_claimed(4));
    Ok(())
}

#[test]
fn fresh_reading_feeds_the_cache() -> TestResult {
    let rig = Rig::new(|chip| chip.with_waveform(Waveform::dht11(KNOWN_FRAME)))?;
    let assembler = rig.assembler();
    assert!(assembler.acquire(GpioPin::DEFAULT, 2).is_fresh());

    let cached = rig.cache().lookup_at(2, rig.clock.wall_time());
    let Some(cached) = cached else {
        panic!("successful read should be cached");
    };
    assert!((cached.record.temperature - 23.0).abs() < f32::EPSILON);
    assert!((cached.record.humidity - 35.0).abs() < f32::EPSILON);
    Ok(())
}

#[test]
fn thirty_seven_pulses_is_insufficient_and_retried() -> TestResult {
    let short = Waveform::from_high_pulses(&[ZERO_BIT_US; 37]);
    let rig = Rig::new(|chip| {
        chip.then_waveform(short)
            .with_waveform(Waveform::dht11(KNOWN_FRAME))
    })?;

    let decoder = dht11_sensor::PulseDecoder::new(rig.clock.clone());
    let first = decoder.read_frame(
        &rig.chip,
        &LineAddress::for_pin(GpioPin::DEFAULT),
        &CancelToken::new(),
    );
    assert_eq!(
        first,
        Err(AcquisitionError::InsufficientData {
            valid_pulses: 37,
            required: 38
        })
    );

    let rig = Rig::new(|chip| {
        chip.then_waveform(Waveform::from_high_pulses(&[ZERO_BIT_US; 37]))
            .with_waveform(Waveform::dht11(KNOWN_FRAME))
    })?;
    let acquisition = rig.assembler().acquire(GpioPin::DEFAULT, 0);
    assert!(acquisition.is_fresh());
    assert_eq!(rig.chip.opens(), 2);
    assert_eq!(rig.retry_waits(), BACKOFF_SCHEDULE[0]);
    Ok(())
}

#[test]
fn exhausted_retries_serve_recent_cache() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    let captured_at = origin() - chrono::Duration::seconds(200);
    rig.cache()
        .record(0, &CacheRecord::new(21.0, 48.0, captured_at))?;

    let assembler = rig.assembler();
    let acquisition = assembler.acquire(GpioPin::DEFAULT, 0);

    assert_eq!(rig.chip.opens(), 13);
    assert_eq!(rig.retry_waits(), Duration::from_millis(9_400));
    let Acquisition::Degraded {
        measurement,
        note,
        age,
    } = acquisition
    else {
        panic!("expected a degraded reading, got {acquisition:?}");
    };
    assert!((measurement.temperature - 21.0).abs() < f32::EPSILON);
    assert!((measurement.humidity - 48.0).abs() < f32::EPSILON);
    assert_eq!(measurement.timestamp, captured_at);
    assert!(age >= Duration::from_secs(200));
    assert!(age < Duration::from_secs(215));
    assert!(note.contains("sensor0"), "{note}");
    assert_eq!(
        note,
        format!(
            "live read failed, using cached data for sensor0 (age {}s)",
            age.as_secs()
        )
    );
    Ok(())
}

#[test]
fn exhausted_retries_without_cache_are_unavailable() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    let reading = rig.assembler().acquire_reading(GpioPin::DEFAULT, 0);

    assert!(!reading.valid);
    assert_eq!(
        reading.error.as_deref(),
        Some("Failed to read DHT11 after 13 attempts")
    );
    Ok(())
}

#[test]
fn stale_cache_is_not_served() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    rig.cache().record(
        0,
        &CacheRecord::new(21.0, 48.0, origin() - chrono::Duration::seconds(601)),
    )?;
    let acquisition = rig.assembler().acquire(GpioPin::DEFAULT, 0);
    assert!(matches!(
        acquisition,
        Acquisition::Unavailable(AcquisitionError::ReadFailed { attempts: 13, .. })
    ));
    Ok(())
}

#[test]
fn unavailable_keeps_last_error_as_source() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    let acquisition = rig.assembler().acquire(GpioPin::DEFAULT, 0);
    let Acquisition::Unavailable(AcquisitionError::ReadFailed { last, .. }) = acquisition else {
        panic!("expected ReadFailed, got {acquisition:?}");
    };
    assert_eq!(
        *last,
        AcquisitionError::NoResponse {
            edge: ResponseEdge::AckLow
        }
    );
    Ok(())
}

#[test]
fn access_denied_stops_after_the_failing_attempt() -> TestResult {
    for k in 1..=5_usize {
        let rig = Rig::new(|chip| {
            let mut chip = chip;
            for _ in 1..k {
                chip = chip.then_waveform(Waveform::silent());
            }
            chip.then_fail(AcquisitionError::access_denied("/dev/gpiochip0"))
                .with_waveform(Waveform::dht11(KNOWN_FRAME))
        })?;
        let acquisition = rig.assembler().acquire(GpioPin::DEFAULT, 0);

        assert_eq!(rig.chip.opens(), k);
        let reading = acquisition.to_reading();
        assert_eq!(
            reading.error.as_deref(),
            Some("GPIO access denied - try running with sudo (/dev/gpiochip0)")
        );
    }
    Ok(())
}

#[test]
fn elevation_is_restored_after_acquisition() -> TestResult {
    let rig = Rig::new(|chip| chip.with_waveform(Waveform::dht11(KNOWN_FRAME)))?;
    let assembler = rig.assembler();
    assert!(assembler.acquire(GpioPin::DEFAULT, 0).is_fresh());
    assert_eq!(
        assembler.scheduler().events(),
        vec![SchedEvent::Elevated { priority: 99 }, SchedEvent::Restored]
    );
    Ok(())
}

#[test]
fn cancellation_releases_a_held_line() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    let cancel = CancelToken::new();
    let address = LineAddress::for_pin(GpioPin::DEFAULT);

    let mut handle = LineHandle::claim(&rig.chip, &address, &cancel)?;
    handle.request_input()?;
    assert!(rig.chip.is_claimed(4));

    assert!(cancel.cancel());
    assert!(!rig.chip.is_claimed(4));
    assert!(matches!(
        handle.get_level(),
        Err(AcquisitionError::HardwareError(_))
    ));
    drop(handle);
    assert_eq!(rig.chip.releases(), 1);
    Ok(())
}

#[test]
fn cancelled_assembler_does_not_touch_the_line() -> TestResult {
    let rig = Rig::new(|chip| chip.with_waveform(Waveform::dht11(KNOWN_FRAME)))?;
    let assembler = rig.assembler();
    assembler.cancel_token().cancel();

    let acquisition = assembler.acquire(GpioPin::DEFAULT, 0);
    assert_eq!(
        acquisition,
        Acquisition::Unavailable(AcquisitionError::Cancelled)
    );
    assert_eq!(rig.chip.opens(), 0);
    Ok(())
}

/// Chip that parks inside `open` until the test lets it continue.
struct GatedChip {
    inner: SimulatedChip,
    entered: parking_lot::Mutex<mpsc::SyncSender<()>>,
    proceed: parking_lot::Mutex<mpsc::Receiver<()>>,
}

impl GpioChip for GatedChip {
    type Line = <SimulatedChip as GpioChip>::Line;

    fn open(&self, address: &LineAddress) -> AcqResult<Self::Line> {
        self.entered
            .lock()
            .send(())
            .map_err(|_closed| AcquisitionError::request_failed("test gate closed"))?;
        self.proceed
            .lock()
            .recv()
            .map_err(|_closed| AcquisitionError::request_failed("test gate closed"))?;
        self.inner.open(address)
    }
}

#[test]
fn concurrent_acquisition_fails_fast() -> TestResult {
    let rig = Rig::new(|chip| chip.with_waveform(Waveform::dht11(KNOWN_FRAME)))?;
    let (entered_tx, entered_rx) = mpsc::sync_channel(1);
    let (proceed_tx, proceed_rx) = mpsc::channel();
    let gated = GatedChip {
        inner: rig.chip.clone(),
        entered: parking_lot::Mutex::new(entered_tx),
        proceed: parking_lot::Mutex::new(proceed_rx),
    };
    let assembler = Arc::new(
        ReadingAssembler::new(gated, RecordingScheduler::new(), rig.clock.clone())
            .with_cache(rig.cache()),
    );

    let worker = {
        let assembler = Arc::clone(&assembler);
        std::thread::spawn(move || assembler.acquire(GpioPin::DEFAULT, 0))
    };
    entered_rx.recv_timeout(Duration::from_secs(5))?;

    let second = assembler.acquire(GpioPin::new(17)?, 1);
    assert_eq!(
        second,
        Acquisition::Unavailable(AcquisitionError::request_failed(
            "acquisition already in progress"
        ))
    );

    proceed_tx.send(())?;
    let first = worker.join().map_err(|_| "worker panicked")?;
    assert!(first.is_fresh());
    Ok(())
}

#[test]
fn second_claim_of_a_held_line_fails() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    let cancel = CancelToken::new();
    let address = LineAddress::for_pin(GpioPin::DEFAULT);
    let _held = LineHandle::claim(&rig.chip, &address, &cancel)?;

    let second = LineHandle::claim(&rig.chip, &address, &cancel);
    assert!(matches!(second, Err(AcquisitionError::RequestFailed(_))));
    assert_eq!(cancel.registered_hooks(), 1);
    Ok(())
}

#[tracing_test::traced_test]
#[test]
fn degraded_reading_is_logged() -> TestResult {
    let rig = Rig::new(|chip| chip)?;
    rig.cache()
        .record(0, &CacheRecord::new(20.0, 40.0, origin()))?;

    let acquisition = rig.assembler().acquire(GpioPin::DEFAULT, 0);
    assert!(matches!(acquisition, Acquisition::Degraded { .. }));
    assert!(logs_contain("Live read failed, serving cached data"));
    assert!(logs_contain("DHT11 read attempts exhausted"));
    Ok(())
}
