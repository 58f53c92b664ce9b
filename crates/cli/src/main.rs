//! sensor-dht11 - DHT11 temperature/humidity reader
//!
//! Reads every configured DHT11 sensor and prints the measurements as JSON,
//! or records them for later fallback when run as a service.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod config;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dht11_sensor::cache::DEFAULT_CACHE_ROOT;
use dht11_watchdog::{
    CancelToken, ExpiryAction, WATCHDOG_EXIT_CODE, WATCHDOG_TIMEOUT, WatchdogGuard,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::error::CliError;
use crate::output::{LocationFilter, MeasureFilter};

#[derive(Parser)]
#[command(name = "sensor-dht11")]
#[command(about = "DHT11 temperature and humidity sensor reader")]
#[command(version)]
#[command(long_about = "
sensor-dht11 reads DHT11 sensors attached to Raspberry Pi GPIO pins and prints
one JSON object per sensor and measurement. Failed live reads fall back to the
most recent recorded reading when it is less than ten minutes old.

Run without a command to read every sensor.
")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Sensor configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory holding recorded readings
    #[arg(long, global = true, env = "DHT11_CACHE_DIR", default_value = DEFAULT_CACHE_ROOT)]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Read temperature and humidity from every sensor
    All,

    /// Read temperature only
    Temperature,

    /// Read humidity only
    Humidity,

    /// Read sensors marked internal
    Internal,

    /// Read sensors not marked internal
    External,

    /// Read every sensor and record the results for fallback
    Record,

    /// Print fixed mock readings without touching the hardware
    Mock,

    /// List the measurements this sensor provides
    List,

    /// Print setup instructions
    Setup,

    /// Print the program version
    Version,

    /// Host hook; nothing to identify, exits successfully
    Identify,

    /// Host enable hook; the sensor needs no enabling
    Enable,
}

impl Commands {
    /// Filters for the read commands; `None` for everything else.
    fn read_filters(&self) -> Option<(MeasureFilter, LocationFilter)> {
        match self {
            Self::All => Some((MeasureFilter::All, LocationFilter::All)),
            Self::Temperature => Some((MeasureFilter::Temperature, LocationFilter::All)),
            Self::Humidity => Some((MeasureFilter::Humidity, LocationFilter::All)),
            Self::Internal => Some((MeasureFilter::All, LocationFilter::Internal)),
            Self::External => Some((MeasureFilter::All, LocationFilter::External)),
            Self::Record
            | Self::Mock
            | Self::List
            | Self::Setup
            | Self::Version
            | Self::Identify
            | Self::Enable => None,
        }
    }

    fn touches_hardware(&self) -> bool {
        self.read_filters().is_some() || *self == Self::Record
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_env| {
                format!("sensor_dht11={log_level},dht11_sensor={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let command = cli.command.as_ref().unwrap_or(&Commands::All);
    if let Err(e) = run(&cli, command) {
        output::print_error(&e);
        let exit_code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        exit(exit_code);
    }
}

#[allow(clippy::exit, reason = "non-zero status is the CLI contract")]
fn exit(code: i32) -> ! {
    std::process::exit(code)
}

fn run(cli: &Cli, command: &Commands) -> Result<()> {
    if !command.touches_hardware() {
        return execute_offline(command);
    }

    let cancel = CancelToken::new();

    // Installed before any other thread so the signal mask is inherited.
    #[cfg(unix)]
    let _signals = dht11_watchdog::TerminationListener::install(cancel.clone())
        .map_err(CliError::from)?;

    let watchdog = WatchdogGuard::arm(
        WATCHDOG_TIMEOUT,
        cancel.clone(),
        ExpiryAction::Terminate {
            exit_code: WATCHDOG_EXIT_CODE,
        },
    )
    .map_err(CliError::from)?;

    let sensors = config::load_sensors(&cli.config);
    debug!(count = sensors.len(), config = %cli.config.display(), "Loaded sensors");
    let assembler = commands::hardware_assembler(&cli.cache_dir, cancel);

    let result = match command.read_filters() {
        Some((measures, location)) => {
            commands::read::execute(&assembler, &sensors, measures, location)
        }
        None => commands::record::execute(&assembler, &sensors),
    };

    watchdog.disarm();
    result
}

fn execute_offline(command: &Commands) -> Result<()> {
    match command {
        Commands::Mock => commands::info::mock(),
        Commands::List => commands::info::list(),
        Commands::Setup => {
            commands::info::setup();
            Ok(())
        }
        Commands::Version => {
            println!("sensor-dht11 {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Identify | Commands::Enable => Ok(()),
        Commands::All
        | Commands::Temperature
        | Commands::Humidity
        | Commands::Internal
        | Commands::External
        | Commands::Record => Ok(()),
    }
}
