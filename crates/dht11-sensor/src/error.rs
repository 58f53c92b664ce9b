//! Acquisition error taxonomy.
//!
//! Retriability is decided by variant, never by message text.

use dht11_watchdog::WatchdogError;
use std::fmt;
use thiserror::Error;

/// Response edge the decoder was waiting for when the sensor went quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEdge {
    /// Sensor pulling the line low to acknowledge the start signal.
    AckLow,
    /// Sensor releasing the line high before data.
    AckHigh,
    /// Line falling into the low phase of the first data bit.
    FirstBit,
}

impl fmt::Display for ResponseEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AckLow => f.write_str("response low"),
            Self::AckHigh => f.write_str("response high"),
            Self::FirstBit => f.write_str("first data bit"),
        }
    }
}

/// Broad class of an [`AcquisitionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorClass {
    /// Insufficient privilege; retrying cannot help.
    Permission,
    /// Kernel or device state; may clear on retry.
    Hardware,
    /// Timing noise on the wire; presumed transient.
    Protocol,
    /// End of the line for this acquisition.
    Terminal,
}

/// Errors raised while acquiring one reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// The process may not access the GPIO device.
    #[error("GPIO access denied - try running with sudo ({0})")]
    AccessDenied(String),

    /// The GPIO chip or line does not exist.
    #[error("GPIO device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The kernel rejected a line request or direction change.
    #[error("GPIO line request failed: {0}")]
    RequestFailed(String),

    /// Reading or driving the line failed mid-transaction.
    #[error("GPIO hardware error: {0}")]
    HardwareError(String),

    /// An edge of the sensor's response never arrived.
    #[error("No response from sensor (timed out waiting for {edge})")]
    NoResponse {
        /// Edge being waited for.
        edge: ResponseEdge,
    },

    /// Too few usable data pulses were captured.
    #[error("Insufficient data: {valid_pulses} valid pulses, need at least {required}")]
    InsufficientData {
        /// Pulses below the long-pulse threshold.
        valid_pulses: usize,
        /// Minimum required to decode.
        required: usize,
    },

    /// The decoded frame failed its checksum.
    #[error("Checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumError {
        /// Sum of the four data bytes.
        computed: u8,
        /// Checksum byte sent by the sensor.
        received: u8,
    },

    /// The backoff schedule ran out.
    #[error("Failed to read DHT11 after {attempts} attempts")]
    ReadFailed {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last: Box<AcquisitionError>,
    },

    /// The acquisition was cancelled by the watchdog or a signal.
    #[error("Acquisition cancelled")]
    Cancelled,
}

impl AcquisitionError {
    /// Classify the error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AccessDenied(_) => ErrorClass::Permission,
            Self::DeviceUnavailable(_) | Self::RequestFailed(_) | Self::HardwareError(_) => {
                ErrorClass::Hardware
            }
            Self::NoResponse { .. } | Self::InsufficientData { .. } | Self::ChecksumError { .. } => {
                ErrorClass::Protocol
            }
            Self::ReadFailed { .. } | Self::Cancelled => ErrorClass::Terminal,
        }
    }

    /// Whether the retry controller should schedule another attempt.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self.class(), ErrorClass::Hardware | ErrorClass::Protocol)
    }

    /// Create an access denied error.
    #[must_use]
    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::AccessDenied(detail.into())
    }

    /// Create a device unavailable error.
    #[must_use]
    pub fn device_unavailable(detail: impl Into<String>) -> Self {
        Self::DeviceUnavailable(detail.into())
    }

    /// Create a request failed error.
    #[must_use]
    pub fn request_failed(detail: impl Into<String>) -> Self {
        Self::RequestFailed(detail.into())
    }

    /// Create a hardware error.
    #[must_use]
    pub fn hardware(detail: impl Into<String>) -> Self {
        Self::HardwareError(detail.into())
    }
}

impl From<WatchdogError> for AcquisitionError {
    fn from(err: WatchdogError) -> Self {
        match err {
            WatchdogError::Cancelled | WatchdogError::Timeout(_) => Self::Cancelled,
            other => Self::RequestFailed(other.to_string()),
        }
    }
}

/// Result alias for acquisition operations.
pub type AcqResult<T> = Result<T, AcquisitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriability_by_class() {
        assert!(!AcquisitionError::access_denied("/dev/gpiomem").is_retriable());
        assert!(AcquisitionError::device_unavailable("gpiochip9").is_retriable());
        assert!(AcquisitionError::request_failed("busy").is_retriable());
        assert!(AcquisitionError::hardware("read").is_retriable());
        assert!(
            AcquisitionError::NoResponse {
                edge: ResponseEdge::AckLow
            }
            .is_retriable()
        );
        assert!(
            AcquisitionError::ChecksumError {
                computed: 1,
                received: 2
            }
            .is_retriable()
        );
        assert!(!AcquisitionError::Cancelled.is_retriable());
    }

    #[test]
    fn test_read_failed_keeps_source() {
        let err = AcquisitionError::ReadFailed {
            attempts: 13,
            last: Box::new(AcquisitionError::InsufficientData {
                valid_pulses: 37,
                required: 38,
            }),
        };
        assert_eq!(err.to_string(), "Failed to read DHT11 after 13 attempts");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("Insufficient data: 37 valid pulses, need at least 38")
        );
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_watchdog_cancellation_maps_to_cancelled() {
        assert_eq!(
            AcquisitionError::from(WatchdogError::Cancelled),
            AcquisitionError::Cancelled
        );
        assert!(matches!(
            AcquisitionError::from(WatchdogError::HookSlotsExhausted(8)),
            AcquisitionError::RequestFailed(_)
        ));
    }

    #[test]
    fn test_display_snapshots() {
        insta::assert_snapshot!(
            AcquisitionError::access_denied("/dev/gpiomem").to_string(),
            @"GPIO access denied - try running with sudo (/dev/gpiomem)"
        );
        insta::assert_snapshot!(
            AcquisitionError::ChecksumError { computed: 0x3A, received: 0x3B }.to_string(),
            @"Checksum mismatch: computed 0x3a, received 0x3b"
        );
        insta::assert_snapshot!(
            AcquisitionError::NoResponse { edge: ResponseEdge::AckHigh }.to_string(),
            @"No response from sensor (timed out waiting for response high)"
        );
    }
}
