//! Deterministic waveform-driven GPIO backend.
//!
//! The simulated sensor starts its waveform when the line switches to input.
//! Every level read costs [`POLL_COST`] of virtual time, so a busy-poll loop
//! walks through the waveform the same way it would walk through real time.

use super::{GpioChip, GpioLine, Level, LineAddress};
use crate::clock::{Clock, VirtualClock};
use crate::error::{AcqResult, AcquisitionError};
use crate::frame::DecodedFrame;
use dht11_watchdog::ReleaseHook;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Virtual time consumed by one level read.
pub const POLL_COST: Duration = Duration::from_micros(1);

/// High-phase width the sensor uses for a 0 bit.
pub const ZERO_BIT_US: u32 = 26;
/// High-phase width the sensor uses for a 1 bit.
pub const ONE_BIT_US: u32 = 70;

const RESPONSE_DELAY_US: u32 = 20;
const RESPONSE_PHASE_US: u32 = 80;
const BIT_LOW_US: u32 = 50;

/// Line levels seen from the moment the line becomes an input.
///
/// After the last segment the pull-up holds the line high.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    segments: Vec<(Level, u32)>,
}

impl Waveform {
    /// A sensor that never answers.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// A well-formed transmission of `bytes`, MSB first.
    #[must_use]
    pub fn dht11(bytes: [u8; 5]) -> Self {
        let widths: Vec<u32> = bytes
            .iter()
            .flat_map(|byte| (0..8).rev().map(move |bit| (byte >> bit) & 1))
            .map(|bit| if bit == 1 { ONE_BIT_US } else { ZERO_BIT_US })
            .collect();
        Self::from_high_pulses(&widths)
    }

    /// A transmission of a decoded frame.
    #[must_use]
    pub fn from_frame(frame: &DecodedFrame) -> Self {
        Self::dht11(frame.bytes())
    }

    /// Response handshake followed by one bit per entry of `widths`, each a
    /// 50 µs low phase and a high phase of the given width.
    #[must_use]
    pub fn from_high_pulses(widths: &[u32]) -> Self {
        let mut segments = vec![
            (Level::High, RESPONSE_DELAY_US),
            (Level::Low, RESPONSE_PHASE_US),
            (Level::High, RESPONSE_PHASE_US),
        ];
        for width in widths {
            segments.push((Level::Low, BIT_LOW_US));
            segments.push((Level::High, *width));
        }
        segments.push((Level::Low, BIT_LOW_US));
        Self { segments }
    }

    /// Respond to the start signal, then hold the line low forever.
    #[must_use]
    pub fn stuck_low() -> Self {
        Self {
            segments: vec![
                (Level::High, RESPONSE_DELAY_US),
                (Level::Low, u32::MAX),
            ],
        }
    }

    /// Level `t_us` microseconds after the line became an input.
    #[must_use]
    pub fn level_at(&self, t_us: u64) -> Level {
        let mut start = 0_u64;
        for (level, width) in &self.segments {
            let end = start + u64::from(*width);
            if t_us < end {
                return *level;
            }
            start = end;
        }
        Level::High
    }
}

type OpenScript = Result<Waveform, AcquisitionError>;

struct SimState {
    clock: VirtualClock,
    default: Mutex<OpenScript>,
    script: Mutex<VecDeque<OpenScript>>,
    claimed: Mutex<HashSet<u32>>,
    opens: AtomicUsize,
    releases: AtomicUsize,
    driven: Mutex<Vec<(u64, Level)>>,
}

impl SimState {
    fn unclaim(&self, offset: u32) {
        self.claimed.lock().remove(&offset);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Simulated GPIO chip.
///
/// Each `open` consumes the next scripted outcome, falling back to the
/// default outcome once the script is empty. Clones share state.
#[derive(Clone)]
pub struct SimulatedChip {
    state: Arc<SimState>,
}

impl SimulatedChip {
    /// Chip whose lines see a silent sensor.
    #[must_use]
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            state: Arc::new(SimState {
                clock,
                default: Mutex::new(Ok(Waveform::silent())),
                script: Mutex::new(VecDeque::new()),
                claimed: Mutex::new(HashSet::new()),
                opens: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                driven: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Use `waveform` for every unscripted open.
    #[must_use]
    pub fn with_waveform(self, waveform: Waveform) -> Self {
        *self.state.default.lock() = Ok(waveform);
        self
    }

    /// Fail every unscripted open with `error`.
    #[must_use]
    pub fn fail_with(self, error: AcquisitionError) -> Self {
        *self.state.default.lock() = Err(error);
        self
    }

    /// Script the next open to see `waveform`.
    #[must_use]
    pub fn then_waveform(self, waveform: Waveform) -> Self {
        self.state.script.lock().push_back(Ok(waveform));
        self
    }

    /// Script the next open to fail with `error`.
    #[must_use]
    pub fn then_fail(self, error: AcquisitionError) -> Self {
        self.state.script.lock().push_back(Err(error));
        self
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of lines released so far.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Whether the line at `offset` is currently claimed.
    #[must_use]
    pub fn is_claimed(&self, offset: u32) -> bool {
        self.state.claimed.lock().contains(&offset)
    }

    /// Output transitions driven by any line, as `(virtual µs, level)`.
    #[must_use]
    pub fn driven(&self) -> Vec<(u64, Level)> {
        self.state.driven.lock().clone()
    }
}

impl fmt::Debug for SimulatedChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedChip")
            .field("opens", &self.opens())
            .field("claimed", &*self.state.claimed.lock())
            .finish_non_exhaustive()
    }
}

impl GpioChip for SimulatedChip {
    type Line = SimulatedLine;

    fn open(&self, address: &LineAddress) -> AcqResult<SimulatedLine> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .state
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.state.default.lock().clone());
        let waveform = outcome?;

        if !self.state.claimed.lock().insert(address.offset) {
            return Err(AcquisitionError::request_failed(format!(
                "line {address} already claimed"
            )));
        }

        Ok(SimulatedLine {
            state: Arc::clone(&self.state),
            offset: address.offset,
            waveform,
            direction: Direction::Unset,
            released: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Unset,
    Output(Level),
    Input { since_us: u64 },
}

/// Line handed out by [`SimulatedChip`].
pub struct SimulatedLine {
    state: Arc<SimState>,
    offset: u32,
    waveform: Waveform,
    direction: Direction,
    released: Arc<AtomicBool>,
}

impl SimulatedLine {
    fn ensure_held(&self) -> AcqResult<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(AcquisitionError::hardware(format!(
                "line {} was released",
                self.offset
            )));
        }
        Ok(())
    }

    fn drive(&mut self, level: Level) {
        self.direction = Direction::Output(level);
        self.state
            .driven
            .lock()
            .push((self.state.clock.now_us(), level));
    }
}

impl fmt::Debug for SimulatedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedLine")
            .field("offset", &self.offset)
            .field("direction", &self.direction)
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl GpioLine for SimulatedLine {
    fn request_output(&mut self, initial: Level) -> AcqResult<()> {
        self.ensure_held()?;
        self.drive(initial);
        Ok(())
    }

    fn request_input(&mut self) -> AcqResult<()> {
        self.ensure_held()?;
        self.direction = Direction::Input {
            since_us: self.state.clock.now_us(),
        };
        Ok(())
    }

    fn set_level(&mut self, level: Level) -> AcqResult<()> {
        self.ensure_held()?;
        match self.direction {
            Direction::Output(_) => {
                self.drive(level);
                Ok(())
            }
            _ => Err(AcquisitionError::hardware(format!(
                "line {} is not an output",
                self.offset
            ))),
        }
    }

    fn get_level(&mut self) -> AcqResult<Level> {
        self.ensure_held()?;
        let now = self.state.clock.now_us();
        self.state.clock.advance(POLL_COST);
        match self.direction {
            Direction::Input { since_us } => Ok(self.waveform.level_at(now - since_us)),
            Direction::Output(level) => Ok(level),
            Direction::Unset => Err(AcquisitionError::hardware(format!(
                "line {} has no direction",
                self.offset
            ))),
        }
    }

    fn release(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.state.unclaim(self.offset);
        }
    }

    fn release_hook(&self) -> ReleaseHook {
        let state = Arc::clone(&self.state);
        let released = Arc::clone(&self.released);
        let offset = self.offset;
        Arc::new(move || {
            if !released.swap(true, Ordering::SeqCst) {
                state.unclaim(offset);
            }
        })
    }
}

impl Drop for SimulatedLine {
    fn drop(&mut self) {
        self.release();
    }
}
