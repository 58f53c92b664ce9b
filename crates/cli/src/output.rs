//! JSON output: one object per sensor and measurement.

use crate::config::SensorConfig;
use chrono::{DateTime, Utc};
use dht11_sensor::Acquisition;
use serde::Serialize;

/// Which measurements to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureFilter {
    All,
    Temperature,
    Humidity,
}

impl MeasureFilter {
    fn includes(self, kind: MeasureKind) -> bool {
        match self {
            Self::All => true,
            Self::Temperature => kind == MeasureKind::Temperature,
            Self::Humidity => kind == MeasureKind::Humidity,
        }
    }
}

/// Which sensors to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationFilter {
    All,
    Internal,
    External,
}

impl LocationFilter {
    pub fn includes(self, sensor: &SensorConfig) -> bool {
        match self {
            Self::All => true,
            Self::Internal => sensor.internal,
            Self::External => !sensor.internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeasureKind {
    Temperature,
    Humidity,
}

impl MeasureKind {
    const ALL: [Self; 2] = [Self::Temperature, Self::Humidity];

    fn sensor(self) -> &'static str {
        match self {
            Self::Temperature => "dht11_temperature",
            Self::Humidity => "dht11_humidity",
        }
    }

    fn measures(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "Celsius",
            Self::Humidity => "percentage",
        }
    }
}

/// One line item of the JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub sensor: &'static str,
    pub measures: &'static str,
    pub unit: &'static str,
    pub value: Option<f64>,
    pub sensor_id: String,
    pub sensor_name: String,
    pub internal: bool,
    pub timestamp: i64,
    pub error: Option<String>,
}

/// Sensor name used when the configuration leaves it unset.
pub const DEFAULT_SENSOR_NAME: &str = "DHT11";

fn one_decimal(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

fn record(
    kind: MeasureKind,
    value: Option<f32>,
    sensor_id: &str,
    sensor_name: &str,
    internal: bool,
    timestamp: DateTime<Utc>,
    error: Option<String>,
) -> MeasurementRecord {
    MeasurementRecord {
        sensor: kind.sensor(),
        measures: kind.measures(),
        unit: kind.unit(),
        value: value.map(one_decimal),
        sensor_id: format!("{sensor_id}_{}", kind.measures()),
        sensor_name: sensor_name.to_string(),
        internal,
        timestamp: timestamp.timestamp(),
        error,
    }
}

/// Records for one acquisition.
///
/// Degraded readings keep their values and carry the fallback note in
/// `error`; unavailable readings have a null value. `read_at` stamps
/// unavailable readings.
pub fn records_for(
    sensor: &SensorConfig,
    acquisition: &Acquisition,
    filter: MeasureFilter,
    read_at: DateTime<Utc>,
) -> Vec<MeasurementRecord> {
    let measurement = acquisition.measurement();
    let timestamp = measurement.map_or(read_at, |m| m.timestamp);
    let name = sensor.sensor_name.as_deref().unwrap_or(DEFAULT_SENSOR_NAME);

    MeasureKind::ALL
        .into_iter()
        .filter(|kind| filter.includes(*kind))
        .map(|kind| {
            let value = measurement.map(|m| match kind {
                MeasureKind::Temperature => m.temperature,
                MeasureKind::Humidity => m.humidity,
            });
            record(
                kind,
                value,
                &sensor.sensor_id,
                name,
                sensor.internal,
                timestamp,
                acquisition.error_text(),
            )
        })
        .collect()
}

/// Fixed records for testing without hardware.
pub fn mock_records(serial: &str, now: DateTime<Utc>) -> Vec<MeasurementRecord> {
    let sensor_id = format!("{serial}_dht11_mock");
    [(MeasureKind::Temperature, 22.0), (MeasureKind::Humidity, 55.0)]
        .into_iter()
        .map(|(kind, value)| record(kind, Some(value), &sensor_id, "Mock DHT11", false, now, None))
        .collect()
}

/// Measurements this sensor provides, for `list`.
pub fn measurement_names() -> Vec<&'static str> {
    MeasureKind::ALL.into_iter().map(MeasureKind::measures).collect()
}

/// Print records as a single-line JSON array.
pub fn print_records(records: &[MeasurementRecord]) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string(records)?);
    Ok(())
}

/// Print an error chain to stderr.
pub fn print_error(error: &anyhow::Error) {
    eprintln!("Error: {error}");
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}
