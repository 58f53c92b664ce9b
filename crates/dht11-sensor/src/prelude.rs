//! Common imports for acquiring readings.

pub use crate::assembler::{AssemblerConfig, ReadingAssembler};
pub use crate::cache::{CacheRecord, CachedReading, ReadingCache};
pub use crate::clock::{Clock, MonotonicClock, VirtualClock};
pub use crate::error::{AcqResult, AcquisitionError};
pub use crate::gpio::{
    GpioChip, GpioLine, GpioPin, HardwareChip, Level, LineAddress, LineHandle, SimulatedChip,
    Waveform,
};
pub use crate::reading::{Acquisition, Measurement, SensorReading};
pub use dht11_watchdog::CancelToken;
