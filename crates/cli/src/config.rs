//! Sensor configuration loaded from `/etc/ws/sensors/dht11.json`.
//!
//! The file holds one sensor object or an array of them:
//!
//! ```json
//! [{"pin": 4, "internal": true, "sensor_id": "greenhouse", "sensor_name": "Greenhouse"}]
//! ```
//!
//! Every field is optional. A missing, empty or unparseable file yields a
//! single default sensor on GPIO 4.

use dht11_sensor::gpio::GpioPin;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Default configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ws/sensors/dht11.json";

/// Where the Pi serial number is read from.
const CPUINFO_PATH: &str = "/proc/cpuinfo";

#[derive(Debug, Deserialize)]
struct RawSensor {
    pin: Option<i64>,
    internal: Option<bool>,
    sensor_id: Option<String>,
    sensor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConfig {
    Many(Vec<RawSensor>),
    One(RawSensor),
}

/// One configured sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub pin: GpioPin,
    pub internal: bool,
    pub sensor_id: String,
    pub sensor_name: Option<String>,
}

impl SensorConfig {
    /// Sensor on the default pin, identified by the Pi serial.
    pub fn default_for(serial: &str) -> Self {
        Self {
            pin: GpioPin::DEFAULT,
            internal: false,
            sensor_id: format!("{serial}_dht11"),
            sensor_name: None,
        }
    }

    fn from_raw(raw: RawSensor, serial: &str) -> Self {
        let pin = match raw.pin {
            None => GpioPin::DEFAULT,
            Some(bcm) => GpioPin::new(bcm).unwrap_or_else(|e| {
                warn!(error = %e, default = %GpioPin::DEFAULT, "Using default GPIO pin");
                GpioPin::DEFAULT
            }),
        };
        Self {
            pin,
            internal: raw.internal.unwrap_or(false),
            sensor_id: raw
                .sensor_id
                .unwrap_or_else(|| format!("{serial}_dht11")),
            sensor_name: raw.sensor_name,
        }
    }
}

/// Parse configuration text; `None` when it holds no sensors.
pub fn parse_config(text: &str, serial: &str) -> Option<Vec<SensorConfig>> {
    let raw = match serde_json::from_str::<RawConfig>(text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed sensor configuration");
            return None;
        }
    };
    let sensors: Vec<SensorConfig> = match raw {
        RawConfig::Many(list) => list
            .into_iter()
            .map(|s| SensorConfig::from_raw(s, serial))
            .collect(),
        RawConfig::One(single) => vec![SensorConfig::from_raw(single, serial)],
    };
    (!sensors.is_empty()).then_some(sensors)
}

/// Load the sensors at `path`, falling back to one default sensor.
pub fn load_sensors(path: &Path) -> Vec<SensorConfig> {
    let serial = pi_serial();
    let loaded = match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => parse_config(&text, &serial),
        Ok(_) => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No sensor configuration");
            None
        }
    };
    loaded.unwrap_or_else(|| vec![SensorConfig::default_for(&serial)])
}

/// Serial number from a `/proc/cpuinfo` listing.
pub fn parse_serial(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "Serial")
        .map(|(_, value)| value.trim().to_string())
        .filter(|serial| !serial.is_empty())
}

/// The Pi's serial number, or `unknown`.
pub fn pi_serial() -> String {
    std::fs::read_to_string(CPUINFO_PATH)
        .ok()
        .as_deref()
        .and_then(parse_serial)
        .unwrap_or_else(|| "unknown".to_string())
}
