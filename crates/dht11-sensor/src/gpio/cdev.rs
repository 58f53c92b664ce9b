//! GPIO character-device backend on `gpiocdev`.
//!
//! Lines are requested from the kernel under the [`CONSUMER`] label, so a
//! line held by any other process (or another request in this one) is
//! refused at `open` instead of being driven concurrently.

use super::slot::ReleasableSlot;
use super::{GpioChip, GpioLine, Level, LineAddress, os_error};
use crate::error::{AcqResult, AcquisitionError};
use dht11_watchdog::ReleaseHook;
use gpiocdev::Request;
use gpiocdev::chip::Chip;
use gpiocdev::line::Value;
use std::fs::File;
use tracing::debug;

/// Consumer label attached to every requested line.
pub const CONSUMER: &str = "sensor-dht11";

const fn to_value(level: Level) -> Value {
    match level {
        Level::Low => Value::Inactive,
        Level::High => Value::Active,
    }
}

/// GPIO chip opened through `/dev/gpiochipN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdevChip;

impl CdevChip {
    /// Create the backend. The chip device is opened on each `open`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl GpioChip for CdevChip {
    type Line = CdevLine;

    fn open(&self, address: &LineAddress) -> AcqResult<CdevLine> {
        // Opening the device ourselves keeps the errno for classification.
        drop(File::open(&address.chip).map_err(|e| os_error(address, &e))?);

        let chip = Chip::from_path(&address.chip).map_err(|e| {
            AcquisitionError::device_unavailable(format!("{address}: not a GPIO chip ({e})"))
        })?;
        let info = chip.line_info(address.offset).map_err(|e| {
            AcquisitionError::device_unavailable(format!("{address}: no such line ({e})"))
        })?;
        if info.used {
            debug!(line = %address, consumer = ?info.consumer, "GPIO line already claimed");
            return Err(AcquisitionError::request_failed(format!(
                "{address} already claimed"
            )));
        }

        // A claim racing ours between the check and the request lands here.
        let request = Request::builder()
            .on_chip(address.chip.clone())
            .with_consumer(CONSUMER)
            .with_line(address.offset)
            .as_input()
            .request()
            .map_err(|e| AcquisitionError::request_failed(format!("{address}: {e}")))?;
        debug!(line = %address, "Requested GPIO line");

        Ok(CdevLine {
            request: ReleasableSlot::new(request, address.clone()),
        })
    }
}

/// Line held through a kernel line request.
///
/// Dropping the request closes its file descriptor, which returns the line
/// to the kernel.
#[derive(Debug)]
pub struct CdevLine {
    request: ReleasableSlot<Request>,
}

impl CdevLine {
    fn reconfigure(&self, output: Option<Level>) -> AcqResult<()> {
        let offset = self.request.address().offset;
        self.request
            .with(|request| {
                let mut config = request.config();
                let line = config.with_line(offset);
                match output {
                    Some(level) => line.as_output(to_value(level)),
                    None => line.as_input(),
                };
                request.reconfigure(&config)
            })
            .and_then(|result| {
                result.map_err(|e| {
                    AcquisitionError::request_failed(format!("{}: {e}", self.request.address()))
                })
            })
    }
}

impl GpioLine for CdevLine {
    fn request_output(&mut self, initial: Level) -> AcqResult<()> {
        self.reconfigure(Some(initial))
    }

    fn request_input(&mut self) -> AcqResult<()> {
        self.reconfigure(None)
    }

    fn set_level(&mut self, level: Level) -> AcqResult<()> {
        let offset = self.request.address().offset;
        self.request
            .with(|request| request.set_value(offset, to_value(level)))
            .and_then(|result| {
                result.map_err(|e| {
                    AcquisitionError::hardware(format!("{}: {e}", self.request.address()))
                })
            })
    }

    fn get_level(&mut self) -> AcqResult<Level> {
        let offset = self.request.address().offset;
        self.request
            .with(|request| request.value(offset))
            .and_then(|result| {
                result
                    .map(|value| Level::from(value == Value::Active))
                    .map_err(|e| {
                        AcquisitionError::hardware(format!("{}: {e}", self.request.address()))
                    })
            })
    }

    fn release(&mut self) {
        if self.request.release() {
            debug!(line = %self.request.address(), "Released GPIO line");
        }
    }

    fn release_hook(&self) -> ReleaseHook {
        self.request.release_hook()
    }
}
