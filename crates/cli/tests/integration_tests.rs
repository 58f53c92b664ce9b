//! Integration tests for the sensor-dht11 binary
//!
//! Only commands that never touch GPIO are exercised here; live reads are
//! covered against the simulated chip in the library crates.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn sensor_dht11() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("sensor-dht11")?)
}

fn stdout_json(cmd: &mut Command) -> Result<Value, Box<dyn std::error::Error>> {
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(format!("command failed: {:?}", output.status).into());
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn help_lists_commands() -> TestResult {
    sensor_dht11()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("temperature"))
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("mock"));
    Ok(())
}

#[test]
fn version_flag_and_command_agree() -> TestResult {
    let expected = format!("sensor-dht11 {}", env!("CARGO_PKG_VERSION"));
    sensor_dht11()?
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.clone()));
    sensor_dht11()?
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::diff(format!("{expected}\n")));
    Ok(())
}

#[test]
fn mock_prints_both_measurements() -> TestResult {
    let json = stdout_json(sensor_dht11()?.arg("mock"))?;
    let records = json.as_array().ok_or("expected a JSON array")?;
    assert_eq!(records.len(), 2);

    let temperature = &records[0];
    assert_eq!(temperature["sensor"], "dht11_temperature");
    assert_eq!(temperature["unit"], "Celsius");
    assert_eq!(temperature["value"], 22.0);
    assert_eq!(temperature["sensor_name"], "Mock DHT11");

    let humidity = &records[1];
    assert_eq!(humidity["sensor"], "dht11_humidity");
    assert_eq!(humidity["unit"], "percentage");
    assert_eq!(humidity["value"], 55.0);

    for record in records {
        assert!(record["timestamp"].is_i64());
        assert!(record.get("error").is_none_or(Value::is_null));
    }
    Ok(())
}

#[test]
fn mock_ignores_missing_config() -> TestResult {
    sensor_dht11()?
        .args(["--config", "/nonexistent/dht11.json", "mock"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["));
    Ok(())
}

#[test]
fn list_prints_measurement_names() -> TestResult {
    let json = stdout_json(sensor_dht11()?.arg("list"))?;
    assert_eq!(json, serde_json::json!(["temperature", "humidity"]));
    Ok(())
}

#[test]
fn setup_needs_nothing() -> TestResult {
    sensor_dht11()?
        .arg("setup")
        .assert()
        .success()
        .stdout(predicate::str::contains("requires no additional setup"));
    Ok(())
}

#[test]
fn identify_and_enable_succeed_silently() -> TestResult {
    for hook in ["identify", "enable"] {
        sensor_dht11()?
            .arg(hook)
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
    Ok(())
}

#[test]
fn unknown_command_fails() -> TestResult {
    sensor_dht11()?
        .arg("calibrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
    Ok(())
}
