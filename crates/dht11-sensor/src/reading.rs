//! Acquisition results.

use crate::error::AcquisitionError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Temperature and humidity for one moment in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// When the values were measured (capture time for cached values).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    /// Live read succeeded.
    Fresh(Measurement),
    /// Live read failed; a cached measurement is served instead.
    Degraded {
        /// Cached values with their capture time.
        measurement: Measurement,
        /// Human-readable explanation of the fallback.
        note: String,
        /// Age of the cached values.
        age: Duration,
    },
    /// Neither a live read nor a fresh cache entry was available.
    Unavailable(AcquisitionError),
}

impl Acquisition {
    /// Values to report, fresh or cached.
    #[must_use]
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            Self::Fresh(measurement) | Self::Degraded { measurement, .. } => Some(measurement),
            Self::Unavailable(_) => None,
        }
    }

    /// Whether the values came from a live read.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    /// Text for the `error` field: the fallback note or the failure.
    #[must_use]
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Fresh(_) => None,
            Self::Degraded { note, .. } => Some(note.clone()),
            Self::Unavailable(error) => Some(error.to_string()),
        }
    }

    /// Flatten into a [`SensorReading`].
    #[must_use]
    pub fn to_reading(&self) -> SensorReading {
        let (temperature, humidity) = self
            .measurement()
            .map_or((0.0, 0.0), |m| (m.temperature, m.humidity));
        SensorReading {
            temperature,
            humidity,
            valid: self.measurement().is_some(),
            error: self.error_text(),
        }
    }
}

/// Flat view of an [`Acquisition`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    /// Degrees Celsius; zero when not valid.
    pub temperature: f32,
    /// Relative humidity in percent; zero when not valid.
    pub humidity: f32,
    /// Whether the values may be reported.
    pub valid: bool,
    /// Fallback note or failure text.
    pub error: Option<String>,
}

impl From<&Acquisition> for SensorReading {
    fn from(acquisition: &Acquisition) -> Self {
        acquisition.to_reading()
    }
}
