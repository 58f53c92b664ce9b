//! Command implementations for the sensor-dht11 CLI

pub mod info;
pub mod read;
pub mod record;

use dht11_scheduler::PosixScheduler;
use dht11_sensor::gpio::HardwareChip;
use dht11_sensor::{MonotonicClock, ReadingAssembler, ReadingCache};
use dht11_watchdog::CancelToken;
use std::path::Path;

/// Assembler wired to the real GPIO backend, scheduler and clock.
pub type HardwareAssembler = ReadingAssembler<HardwareChip, PosixScheduler, MonotonicClock>;

/// Build the hardware assembler sharing `cancel` with the watchdog.
pub fn hardware_assembler(cache_dir: &Path, cancel: CancelToken) -> HardwareAssembler {
    ReadingAssembler::new(HardwareChip::default(), PosixScheduler::new(), MonotonicClock::new())
        .with_cache(ReadingCache::new(cache_dir))
        .with_cancel_token(cancel)
}
