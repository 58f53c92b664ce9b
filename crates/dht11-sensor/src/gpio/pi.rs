//! Raspberry Pi backend on `rppal`.
//!
//! `rppal` drives the BCM GPIO block through `/dev/gpiomem`, bypassing the
//! kernel's line ownership: claims are exclusive within this process only.
//! Only `/dev/gpiochip0` is accepted, whose offsets are the BCM numbers.

use super::slot::ReleasableSlot;
use super::{DEFAULT_CHIP_PATH, GpioChip, GpioLine, Level, LineAddress};
use crate::error::{AcqResult, AcquisitionError};
use dht11_watchdog::ReleaseHook;
use rppal::gpio::{self, Gpio, IoPin, Mode};
use std::path::Path;
use tracing::debug;

fn map_gpio_error(address: &LineAddress, err: gpio::Error) -> AcquisitionError {
    match err {
        gpio::Error::PermissionDenied(path) => {
            AcquisitionError::access_denied(format!("{address}: {path}"))
        }
        gpio::Error::PinUsed(pin) => {
            AcquisitionError::request_failed(format!("GPIO{pin} is already in use"))
        }
        gpio::Error::PinNotAvailable(pin) => {
            AcquisitionError::device_unavailable(format!("GPIO{pin} is not available"))
        }
        gpio::Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            AcquisitionError::access_denied(format!("{address}: {io}"))
        }
        other => AcquisitionError::device_unavailable(format!("{address}: {other}")),
    }
}

const fn to_rppal(level: Level) -> gpio::Level {
    match level {
        Level::Low => gpio::Level::Low,
        Level::High => gpio::Level::High,
    }
}

/// GPIO chip backed by the Pi's GPIO peripheral.
#[derive(Debug, Clone, Copy, Default)]
pub struct RppalChip;

impl RppalChip {
    /// Create the backend. The peripheral is mapped on each `open`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl GpioChip for RppalChip {
    type Line = RppalLine;

    fn open(&self, address: &LineAddress) -> AcqResult<RppalLine> {
        if address.chip != Path::new(DEFAULT_CHIP_PATH) {
            return Err(AcquisitionError::device_unavailable(format!(
                "{address}: the rppal backend only drives {DEFAULT_CHIP_PATH}"
            )));
        }
        if !address.chip.exists() {
            return Err(AcquisitionError::device_unavailable(format!(
                "{} does not exist",
                address.chip.display()
            )));
        }
        let bcm = u8::try_from(address.offset).map_err(|_overflow| {
            AcquisitionError::device_unavailable(format!("{address}: no such line"))
        })?;

        let gpio = Gpio::new().map_err(|e| map_gpio_error(address, e))?;
        let pin = gpio.get(bcm).map_err(|e| map_gpio_error(address, e))?;
        debug!(line = %address, "Opened GPIO line");

        Ok(RppalLine {
            pin: ReleasableSlot::new(pin.into_io(Mode::Input), address.clone()),
        })
    }
}

/// Line claimed through `rppal`.
///
/// Dropping the `IoPin` (from the owner or the release hook) resets its mode.
#[derive(Debug)]
pub struct RppalLine {
    pin: ReleasableSlot<IoPin>,
}

impl GpioLine for RppalLine {
    fn request_output(&mut self, initial: Level) -> AcqResult<()> {
        self.pin
            .with(|pin| {
                pin.write(to_rppal(initial));
                pin.set_mode(Mode::Output);
            })
            .map_err(|e| AcquisitionError::request_failed(e.to_string()))
    }

    fn request_input(&mut self) -> AcqResult<()> {
        self.pin
            .with(|pin| pin.set_mode(Mode::Input))
            .map_err(|e| AcquisitionError::request_failed(e.to_string()))
    }

    fn set_level(&mut self, level: Level) -> AcqResult<()> {
        self.pin.with(|pin| pin.write(to_rppal(level)))
    }

    fn get_level(&mut self) -> AcqResult<Level> {
        self.pin.with(|pin| Level::from(pin.read() == gpio::Level::High))
    }

    fn release(&mut self) {
        if self.pin.release() {
            debug!(line = %self.pin.address(), "Released GPIO line");
        }
    }

    fn release_hook(&self) -> ReleaseHook {
        self.pin.release_hook()
    }
}
