//! Single-wire transaction and pulse-width decoding.
//!
//! A read is: wake the sensor, follow its three response edges, time up to 50
//! high pulses, then turn the pulse widths into bits. Capture talks to the
//! line; [`decode_pulses`] is pure and works on the captured [`PulseBuffer`].

use crate::clock::Clock;
use crate::error::{AcqResult, AcquisitionError, ResponseEdge};
use crate::frame::{DecodedFrame, FRAME_BITS, FRAME_LEN};
use crate::gpio::{GpioChip, GpioLine, Level, LineAddress, LineHandle};
use dht11_watchdog::CancelToken;
use std::time::Duration;
use tracing::{debug, trace};

/// Capacity of a [`PulseBuffer`].
pub const MAX_PULSES: usize = 50;

/// Protocol timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTiming {
    /// Low phase of the wake signal.
    pub start_low: Duration,
    /// High phase after the wake signal, before switching to input.
    pub start_high: Duration,
    /// Bound on each busy-poll for a level change, in microseconds.
    pub edge_timeout_us: u64,
    /// Pulses at or above this width are not data bits; above it, capture ends.
    pub long_pulse_us: u32,
    /// Minimum number of data pulses needed to decode.
    pub min_valid_pulses: usize,
}

impl ProtocolTiming {
    /// DHT11 timing.
    pub const DHT11: Self = Self {
        start_low: Duration::from_millis(20),
        start_high: Duration::from_micros(20),
        edge_timeout_us: 1_000,
        long_pulse_us: 500,
        min_valid_pulses: 38,
    };
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self::DHT11
    }
}

/// Fixed-capacity buffer of high-pulse widths in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseBuffer {
    widths: [u32; MAX_PULSES],
    len: usize,
}

impl PulseBuffer {
    /// Empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            widths: [0; MAX_PULSES],
            len: 0,
        }
    }

    /// Buffer holding the first [`MAX_PULSES`] entries of `widths`.
    #[must_use]
    pub fn from_widths(widths: &[u32]) -> Self {
        let mut buffer = Self::new();
        for width in widths {
            if !buffer.push(*width) {
                break;
            }
        }
        buffer
    }

    /// Append a width; returns `false` when the buffer is full.
    pub fn push(&mut self, width_us: u32) -> bool {
        match self.widths.get_mut(self.len) {
            Some(slot) => {
                *slot = width_us;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    /// Captured widths.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.widths[..self.len]
    }

    /// Number of captured widths.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was captured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the buffer is at capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == MAX_PULSES
    }
}

impl Default for PulseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode captured pulses into a checksum-verified frame.
///
/// Pulses shorter than `timing.long_pulse_us` are data bits. The bit threshold
/// is the integer midpoint of the shortest and longest data pulse; a pulse
/// strictly above it is a 1. When fewer than 40 data pulses were seen, the
/// missing bits are assumed to be leading zeros. Extra pulses past 40 are
/// ignored.
///
/// # Errors
///
/// [`AcquisitionError::InsufficientData`] below `timing.min_valid_pulses`,
/// [`AcquisitionError::ChecksumError`] when the decoded frame does not verify.
pub fn decode_pulses(pulses: &PulseBuffer, timing: &ProtocolTiming) -> AcqResult<DecodedFrame> {
    let is_data = |width: &&u32| **width < timing.long_pulse_us;
    let valid = pulses.as_slice().iter().filter(is_data).count();
    if valid < timing.min_valid_pulses {
        return Err(AcquisitionError::InsufficientData {
            valid_pulses: valid,
            required: timing.min_valid_pulses,
        });
    }

    let (min, max) = pulses
        .as_slice()
        .iter()
        .filter(is_data)
        .fold((u32::MAX, 0_u32), |(lo, hi), w| (lo.min(*w), hi.max(*w)));
    let threshold = (min + max) / 2;

    let padding = FRAME_BITS.saturating_sub(valid);
    let bits = std::iter::repeat_n(false, padding).chain(
        pulses
            .as_slice()
            .iter()
            .filter(is_data)
            .map(|width| *width > threshold),
    );

    let mut bytes = [0_u8; FRAME_LEN];
    for (index, bit) in bits.take(FRAME_BITS).enumerate() {
        let byte = &mut bytes[index / 8];
        *byte = (*byte << 1) | u8::from(bit);
    }

    trace!(valid, padding, threshold, ?bytes, "Decoded pulse train");
    DecodedFrame::from_bytes(bytes)
}

/// Busy-poll until the line reads `level`.
///
/// Returns the microseconds waited, or `None` once `timeout_us` has passed.
fn wait_for_level<L, C>(line: &mut L, clock: &C, level: Level, timeout_us: u64) -> AcqResult<Option<u64>>
where
    L: GpioLine + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now_us();
    let deadline = start.saturating_add(timeout_us);
    while line.get_level()? != level {
        if clock.now_us() > deadline {
            return Ok(None);
        }
    }
    Ok(Some(clock.now_us() - start))
}

/// Follow the response handshake, then time the data pulses.
///
/// The line must already be an input.
///
/// # Errors
///
/// [`AcquisitionError::NoResponse`] naming the missed edge, or
/// [`AcquisitionError::HardwareError`] when the line cannot be read.
pub fn capture_pulses<L, C>(line: &mut L, clock: &C, timing: &ProtocolTiming) -> AcqResult<PulseBuffer>
where
    L: GpioLine + ?Sized,
    C: Clock + ?Sized,
{
    let handshake = [
        (Level::Low, ResponseEdge::AckLow),
        (Level::High, ResponseEdge::AckHigh),
        (Level::Low, ResponseEdge::FirstBit),
    ];
    for (level, edge) in handshake {
        if wait_for_level(line, clock, level, timing.edge_timeout_us)?.is_none() {
            return Err(AcquisitionError::NoResponse { edge });
        }
    }

    let mut pulses = PulseBuffer::new();
    while !pulses.is_full() {
        if wait_for_level(line, clock, Level::High, timing.edge_timeout_us)?.is_none() {
            break;
        }
        let start = clock.now_us();
        // A missing falling edge shows up as an over-long pulse below.
        let _ = wait_for_level(line, clock, Level::Low, timing.edge_timeout_us)?;
        let width = u32::try_from(clock.now_us() - start).unwrap_or(u32::MAX);
        pulses.push(width);
        if width > timing.long_pulse_us {
            break;
        }
    }

    Ok(pulses)
}

/// Runs one complete read transaction.
#[derive(Debug, Clone)]
pub struct PulseDecoder<C> {
    clock: C,
    timing: ProtocolTiming,
}

impl<C: Clock> PulseDecoder<C> {
    /// Decoder with DHT11 timing.
    pub fn new(clock: C) -> Self {
        Self::with_timing(clock, ProtocolTiming::DHT11)
    }

    /// Decoder with custom timing.
    pub fn with_timing(clock: C, timing: ProtocolTiming) -> Self {
        Self { clock, timing }
    }

    /// The clock used for protocol timing.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Timing parameters in use.
    pub fn timing(&self) -> &ProtocolTiming {
        &self.timing
    }

    /// Claim the line, run the transaction and decode the frame.
    ///
    /// The line is released before decoding, on success and on every error.
    ///
    /// # Errors
    ///
    /// Any [`AcquisitionError`] from claiming, driving, capturing or decoding.
    pub fn read_frame<G>(&self, chip: &G, address: &LineAddress, cancel: &CancelToken) -> AcqResult<DecodedFrame>
    where
        G: GpioChip + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }

        let pulses = {
            let mut line = LineHandle::claim(chip, address, cancel)?;
            line.request_output(Level::High)?;
            line.set_level(Level::Low)?;
            self.clock.delay(self.timing.start_low);
            line.set_level(Level::High)?;
            self.clock.delay(self.timing.start_high);
            line.request_input()?;
            capture_pulses(&mut *line, &self.clock, &self.timing)?
        };

        debug!(line = %address, pulses = pulses.len(), "Captured pulse train");
        decode_pulses(&pulses, &self.timing)
    }
}
