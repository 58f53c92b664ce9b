//! # dht11-sensor
//!
//! Acquisition engine for the DHT11 single-wire humidity/temperature sensor,
//! read by bit-banging a Raspberry Pi GPIO line.
//!
//! ## Architecture
//!
//! Leaf to root:
//!
//! - [`gpio`] - exclusive line handles over a [`GpioChip`](gpio::GpioChip)
//!   backend (kernel line requests through `gpiocdev` on hardware, a
//!   waveform simulator in tests)
//! - [`decoder`] - the start/response/data-bit transaction and the
//!   pulse-width decoding into a checksum-valid [`DecodedFrame`]
//! - [`retry`] - the fixed backoff schedule, run under scoped real-time
//!   elevation
//! - [`cache`] - last-known-good readings with a 600 s freshness window
//! - [`assembler`] - one [`Acquisition`] per pin: fresh, degraded (served
//!   from cache) or unavailable
//!
//! Acquisitions are strictly serialized. All protocol waits are busy-polls
//! against an injected monotonic [`Clock`]; only the coarse retry waits yield.
//!
//! ## Example
//!
//! ```rust
//! use dht11_sensor::prelude::*;
//! use dht11_scheduler::RecordingScheduler;
//!
//! let clock = VirtualClock::new();
//! let chip = SimulatedChip::new(clock.clone())
//!     .with_waveform(Waveform::dht11([0x23, 0x00, 0x17, 0x00, 0x3A]));
//! let assembler = ReadingAssembler::new(chip, RecordingScheduler::new(), clock)
//!     .with_cache(ReadingCache::new(std::env::temp_dir().join("dht11-doc")));
//!
//! let pin = GpioPin::new(4).expect("pin in range");
//! let acquisition = assembler.acquire(pin, 0);
//! let measurement = acquisition.measurement().expect("fresh reading");
//! assert!((measurement.humidity - 35.0).abs() < f32::EPSILON);
//! assert!((measurement.temperature - 23.0).abs() < f32::EPSILON);
//! ```

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assembler;
pub mod cache;
pub mod clock;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod gpio;
pub mod reading;
pub mod retry;

pub mod prelude;

pub use assembler::{AssemblerConfig, ReadingAssembler};
pub use cache::{CacheError, CacheRecord, CachedReading, ReadingCache};
pub use clock::{Clock, MonotonicClock, VirtualClock};
pub use decoder::{PulseBuffer, PulseDecoder, ProtocolTiming, decode_pulses};
pub use error::{AcqResult, AcquisitionError, ErrorClass, ResponseEdge};
pub use frame::DecodedFrame;
pub use gpio::{GpioChip, GpioLine, GpioPin, LineAddress};
pub use reading::{Acquisition, Measurement, SensorReading};
pub use retry::{RetryController, RetryOutcome, RetrySchedule};
