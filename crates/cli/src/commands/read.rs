//! Live readings printed as JSON.

use anyhow::Result;
use chrono::Utc;
use dht11_sensor::{Clock, GpioChip, ReadingAssembler};
use dht11_scheduler::SchedulerControl;
use tracing::debug;

use crate::config::SensorConfig;
use crate::output::{self, LocationFilter, MeasureFilter, MeasurementRecord};

/// Read every selected sensor; failures become records with an `error`.
pub fn collect<G, S, C>(
    assembler: &ReadingAssembler<G, S, C>,
    sensors: &[SensorConfig],
    measures: MeasureFilter,
    location: LocationFilter,
) -> Vec<MeasurementRecord>
where
    G: GpioChip,
    S: SchedulerControl,
    C: Clock + Clone,
{
    sensors
        .iter()
        .enumerate()
        .filter(|(_, sensor)| location.includes(sensor))
        .flat_map(|(index, sensor)| {
            let read_at = Utc::now();
            let acquisition = assembler.acquire(sensor.pin, index);
            debug!(sensor = index, pin = %sensor.pin, fresh = acquisition.is_fresh(), "Sensor read");
            output::records_for(sensor, &acquisition, measures, read_at)
        })
        .collect()
}

/// Execute a read command.
pub fn execute<G, S, C>(
    assembler: &ReadingAssembler<G, S, C>,
    sensors: &[SensorConfig],
    measures: MeasureFilter,
    location: LocationFilter,
) -> Result<()>
where
    G: GpioChip,
    S: SchedulerControl,
    C: Clock + Clone,
{
    let records = collect(assembler, sensors, measures, location);
    output::print_records(&records)?;
    Ok(())
}
