//! Commands that never touch the hardware.

use anyhow::Result;
use chrono::Utc;

use crate::config;
use crate::output;

/// Print fixed mock readings.
pub fn mock() -> Result<()> {
    let records = output::mock_records(&config::pi_serial(), Utc::now());
    output::print_records(&records)?;
    Ok(())
}

/// Print the measurements this sensor provides.
pub fn list() -> Result<()> {
    println!("{}", serde_json::to_string(&output::measurement_names())?);
    Ok(())
}

/// Print setup instructions.
pub fn setup() {
    println!("DHT11 sensor requires no additional setup.");
}
