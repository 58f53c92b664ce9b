//! Service mode: read every sensor and persist the results for fallback.

use anyhow::Result;
use dht11_sensor::{Clock, GpioChip, ReadingAssembler};
use dht11_scheduler::SchedulerControl;
use tracing::{error, info, warn};

use crate::config::SensorConfig;
use crate::error::CliError;

/// Status file names next to the cached reading.
pub const STATUS_SENSOR_ID: &str = "sensor_id";
pub const STATUS_INTERNAL: &str = "internal";
pub const STATUS_TIMESTAMP: &str = "timestamp";
pub const STATUS_ERROR: &str = "error";

/// Record one sensor; returns whether it succeeded.
///
/// The `timestamp` file holds the time this sensor's read started.
fn record_sensor<G, S, C>(
    assembler: &ReadingAssembler<G, S, C>,
    index: usize,
    sensor: &SensorConfig,
) -> bool
where
    G: GpioChip,
    S: SchedulerControl,
    C: Clock + Clone,
{
    let cache = assembler.cache();
    let now = assembler.clock().wall_time().timestamp();
    let internal = if sensor.internal { "true" } else { "false" };
    let metadata = [
        (STATUS_SENSOR_ID, sensor.sensor_id.clone()),
        (STATUS_INTERNAL, internal.to_string()),
        (STATUS_TIMESTAMP, now.to_string()),
    ];
    for (name, contents) in &metadata {
        if let Err(e) = cache.write_status(index, name, contents) {
            error!(sensor = index, file = name, error = %e, "Failed to write status file");
            return false;
        }
    }

    match assembler.acquire_live(sensor.pin, index) {
        Ok(measurement) => {
            if let Err(e) = cache.remove_status(index, STATUS_ERROR) {
                warn!(sensor = index, error = %e, "Failed to clear stale error file");
            }
            info!(
                sensor = index,
                temperature = measurement.temperature,
                humidity = measurement.humidity,
                "Recorded reading"
            );
            true
        }
        Err(e) => {
            let message = e.to_string();
            if let Err(write_err) = cache.write_status(index, STATUS_ERROR, &message) {
                warn!(sensor = index, error = %write_err, "Failed to write error file");
            }
            error!(sensor = index, error = %message, "Read failed");
            false
        }
    }
}

/// Record every configured sensor.
pub fn execute<G, S, C>(assembler: &ReadingAssembler<G, S, C>, sensors: &[SensorConfig]) -> Result<()>
where
    G: GpioChip,
    S: SchedulerControl,
    C: Clock + Clone,
{
    let failed = sensors
        .iter()
        .enumerate()
        .filter(|(index, sensor)| !record_sensor(assembler, *index, sensor))
        .count();

    if failed > 0 {
        return Err(CliError::RecordFailed {
            failed,
            total: sensors.len(),
        }
        .into());
    }
    Ok(())
}
