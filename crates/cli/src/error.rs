//! Error types for the sensor-dht11 CLI

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{failed} of {total} sensors failed to record")]
    RecordFailed { failed: usize, total: usize },

    #[error("Watchdog setup failed: {0}")]
    Watchdog(#[from] dht11_watchdog::WatchdogError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::JsonError(_) => 4,
            Self::RecordFailed { .. } | Self::Watchdog(_) | Self::IoError(_) => 1,
        }
    }
}
