//! GPIO line access.
//!
//! A [`GpioChip`] opens one [`GpioLine`] for exclusive use. Callers never hold
//! a bare line: [`LineHandle`] owns it, registers its release hook with the
//! acquisition's [`CancelToken`] and releases it on drop, so the line is handed
//! back on every exit path including watchdog expiry.

use crate::error::{AcqResult, AcquisitionError};
use dht11_watchdog::{CancelToken, HookRegistration, ReleaseHook};
use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

#[cfg(all(target_os = "linux", feature = "cdev"))]
mod cdev;
#[cfg(all(target_os = "linux", feature = "rppal"))]
mod pi;
pub mod sim;
mod slot;

#[cfg(all(target_os = "linux", feature = "cdev"))]
pub use cdev::{CONSUMER, CdevChip, CdevLine};
#[cfg(all(target_os = "linux", feature = "rppal"))]
pub use pi::{RppalChip, RppalLine};
pub use sim::{SimulatedChip, SimulatedLine, Waveform};

/// Character device of the Pi's primary GPIO bank.
pub const DEFAULT_CHIP_PATH: &str = "/dev/gpiochip0";

/// Logic level of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Driven or read low.
    Low,
    /// Driven or read high.
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

/// Location of one line on a GPIO chip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineAddress {
    /// Chip character device.
    pub chip: PathBuf,
    /// Line offset on that chip (the BCM number on `/dev/gpiochip0`).
    pub offset: u32,
}

impl LineAddress {
    /// Address `offset` on `chip`.
    #[must_use]
    pub fn new(chip: impl Into<PathBuf>, offset: u32) -> Self {
        Self {
            chip: chip.into(),
            offset,
        }
    }

    /// Address a BCM pin on the default chip.
    #[must_use]
    pub fn for_pin(pin: GpioPin) -> Self {
        Self::new(DEFAULT_CHIP_PATH, u32::from(pin.bcm()))
    }
}

impl fmt::Display for LineAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chip.display(), self.offset)
    }
}

/// Pin number outside the usable header range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid GPIO pin {0} (must be 2-27)")]
pub struct PinRangeError(pub i64);

/// BCM GPIO number usable for a sensor data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpioPin(u8);

impl GpioPin {
    /// Lowest usable BCM number.
    pub const MIN: u8 = 2;
    /// Highest usable BCM number.
    pub const MAX: u8 = 27;
    /// Pin used when none is configured.
    pub const DEFAULT: Self = Self(4);

    /// Validate a BCM number.
    ///
    /// # Errors
    ///
    /// Returns [`PinRangeError`] outside `2..=27`.
    pub fn new(bcm: i64) -> Result<Self, PinRangeError> {
        u8::try_from(bcm)
            .ok()
            .filter(|n| (Self::MIN..=Self::MAX).contains(n))
            .map(Self)
            .ok_or(PinRangeError(bcm))
    }

    /// BCM number.
    #[must_use]
    pub const fn bcm(self) -> u8 {
        self.0
    }
}

impl Default for GpioPin {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

impl TryFrom<i64> for GpioPin {
    type Error = PinRangeError;

    fn try_from(bcm: i64) -> Result<Self, Self::Error> {
        Self::new(bcm)
    }
}

/// One claimed GPIO line.
pub trait GpioLine: Send {
    /// Switch to output, driving `initial` immediately.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::RequestFailed`] when the direction change is refused.
    fn request_output(&mut self, initial: Level) -> AcqResult<()>;

    /// Switch to input.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::RequestFailed`] when the direction change is refused.
    fn request_input(&mut self) -> AcqResult<()>;

    /// Drive the line. Non-blocking.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::HardwareError`] when the write fails.
    fn set_level(&mut self, level: Level) -> AcqResult<()>;

    /// Sample the line. Non-blocking.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::HardwareError`] when the read fails.
    fn get_level(&mut self) -> AcqResult<Level>;

    /// Hand the line back to the kernel. Idempotent.
    fn release(&mut self);

    /// Release callback usable from another thread while the line is held.
    fn release_hook(&self) -> ReleaseHook;
}

/// Source of exclusive GPIO lines.
pub trait GpioChip {
    /// Line type handed out by this chip.
    type Line: GpioLine;

    /// Claim the line at `address`.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::AccessDenied`] on a permission failure,
    /// [`AcquisitionError::DeviceUnavailable`] when the chip or line does not
    /// exist and [`AcquisitionError::RequestFailed`] when it is already claimed.
    fn open(&self, address: &LineAddress) -> AcqResult<Self::Line>;
}

impl<G: GpioChip + ?Sized> GpioChip for &G {
    type Line = G::Line;

    fn open(&self, address: &LineAddress) -> AcqResult<Self::Line> {
        (**self).open(address)
    }
}

/// Scoped owner of a claimed line.
pub struct LineHandle<L: GpioLine> {
    line: L,
    registration: Option<HookRegistration>,
    address: LineAddress,
}

impl<L: GpioLine> LineHandle<L> {
    /// Open `address` on `chip` and tie its release to `cancel`.
    ///
    /// # Errors
    ///
    /// Propagates open failures, and returns [`AcquisitionError::Cancelled`]
    /// when `cancel` has already fired.
    pub fn claim<G>(chip: &G, address: &LineAddress, cancel: &CancelToken) -> AcqResult<Self>
    where
        G: GpioChip<Line = L> + ?Sized,
    {
        let mut line = chip.open(address)?;
        let registration = match cancel.register(line.release_hook()) {
            Ok(registration) => registration,
            Err(e) => {
                line.release();
                return Err(AcquisitionError::from(e));
            }
        };
        trace!(line = %address, "GPIO line claimed");
        Ok(Self {
            line,
            registration: Some(registration),
            address: address.clone(),
        })
    }

    /// Address of the held line.
    #[must_use]
    pub fn address(&self) -> &LineAddress {
        &self.address
    }
}

impl<L: GpioLine> Deref for LineHandle<L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.line
    }
}

impl<L: GpioLine> DerefMut for LineHandle<L> {
    fn deref_mut(&mut self) -> &mut L {
        &mut self.line
    }
}

impl<L: GpioLine> Drop for LineHandle<L> {
    fn drop(&mut self) {
        drop(self.registration.take());
        self.line.release();
        trace!(line = %self.address, "GPIO line released");
    }
}

impl<L: GpioLine> fmt::Debug for LineHandle<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Stand-in backend for builds without GPIO hardware support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableChip;

/// Line type of [`UnavailableChip`]; cannot be constructed.
#[derive(Debug)]
pub enum NoLine {}

impl GpioLine for NoLine {
    fn request_output(&mut self, _initial: Level) -> AcqResult<()> {
        match *self {}
    }

    fn request_input(&mut self) -> AcqResult<()> {
        match *self {}
    }

    fn set_level(&mut self, _level: Level) -> AcqResult<()> {
        match *self {}
    }

    fn get_level(&mut self) -> AcqResult<Level> {
        match *self {}
    }

    fn release(&mut self) {
        match *self {}
    }

    fn release_hook(&self) -> ReleaseHook {
        Arc::new(|| {})
    }
}

impl GpioChip for UnavailableChip {
    type Line = NoLine;

    fn open(&self, address: &LineAddress) -> AcqResult<NoLine> {
        Err(AcquisitionError::device_unavailable(format!(
            "{address}: built without GPIO hardware support"
        )))
    }
}

/// Classify an OS error raised while opening or claiming `address`.
///
/// Permission errors are not retriable; a line held by another consumer is a
/// failed request; anything else means the chip or line is unusable.
#[must_use]
pub fn os_error(address: &LineAddress, err: &io::Error) -> AcquisitionError {
    let detail = format!("{address}: {err}");
    match err.raw_os_error() {
        Some(libc::EACCES | libc::EPERM) => AcquisitionError::access_denied(detail),
        Some(libc::EBUSY) => AcquisitionError::request_failed(detail),
        Some(libc::ENOENT | libc::ENODEV | libc::ENXIO) => {
            AcquisitionError::device_unavailable(detail)
        }
        _ if err.kind() == io::ErrorKind::PermissionDenied => {
            AcquisitionError::access_denied(detail)
        }
        _ => AcquisitionError::device_unavailable(detail),
    }
}

/// Backend used on real hardware for this build.
#[cfg(all(target_os = "linux", feature = "cdev"))]
pub type HardwareChip = CdevChip;

/// Backend used on real hardware for this build.
#[cfg(all(target_os = "linux", feature = "rppal", not(feature = "cdev")))]
pub type HardwareChip = RppalChip;

/// Backend used on real hardware for this build.
#[cfg(not(all(target_os = "linux", any(feature = "cdev", feature = "rppal"))))]
pub type HardwareChip = UnavailableChip;
