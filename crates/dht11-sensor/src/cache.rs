//! Last-known-good readings for when a live read fails.
//!
//! One directory per sensor index under the cache root:
//!
//! ```text
//! /run/ws/dht/sensor0/reading.json   {"temperature":23.0,"humidity":35.0,"captured_at":1700000000}
//! /run/ws/dht/sensor0/temperature    23.0
//! /run/ws/dht/sensor0/humidity       35.0
//! /run/ws/dht/sensor0/sensor_id      status files written by the `record` command
//! /run/ws/dht/sensor0/internal
//! /run/ws/dht/sensor0/timestamp
//! /run/ws/dht/sensor0/error          present only while the last read failed
//! ```
//!
//! Every file is replaced whole through a temp file in the same directory, so
//! readers in other processes never see a partial write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Default cache root.
pub const DEFAULT_CACHE_ROOT: &str = "/run/ws/dht";

/// Records older than this are never served.
pub const MAX_CACHE_AGE: Duration = Duration::from_secs(600);

const READING_FILE: &str = "reading.json";

/// Plain-text value files, one decimal place.
pub const TEMPERATURE_FILE: &str = "temperature";
pub const HUMIDITY_FILE: &str = "humidity";

/// Cache write failures.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Creating or writing a cache file failed.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The record could not be encoded.
    #[error("failed to encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One persisted reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// When the values were measured.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub captured_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Create a record.
    #[must_use]
    pub fn new(temperature: f32, humidity: f32, captured_at: DateTime<Utc>) -> Self {
        Self {
            temperature,
            humidity,
            captured_at,
        }
    }
}

/// A record fresh enough to serve, with its age.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedReading {
    /// The stored values, unmodified.
    pub record: CacheRecord,
    /// Whole seconds since capture; zero for records stamped in the future.
    pub age: Duration,
}

/// File-backed reading cache.
#[derive(Debug, Clone)]
pub struct ReadingCache {
    root: PathBuf,
    max_age: Duration,
}

impl ReadingCache {
    /// Cache rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age: MAX_CACHE_AGE,
        }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one sensor.
    #[must_use]
    pub fn sensor_dir(&self, sensor_index: usize) -> PathBuf {
        self.root.join(format!("sensor{sensor_index}"))
    }

    /// Persist `record` as the latest reading of `sensor_index`.
    ///
    /// Besides `reading.json` the values land in the `temperature` and
    /// `humidity` files for consumers of the run directory.
    ///
    /// # Errors
    ///
    /// [`CacheError`] when the directory or file cannot be written.
    pub fn record(&self, sensor_index: usize, record: &CacheRecord) -> Result<(), CacheError> {
        let encoded = serde_json::to_vec(record)?;
        self.write_file(sensor_index, READING_FILE, &encoded)?;
        self.write_status(sensor_index, TEMPERATURE_FILE, &format!("{:.1}", record.temperature))?;
        self.write_status(sensor_index, HUMIDITY_FILE, &format!("{:.1}", record.humidity))?;
        debug!(
            sensor = sensor_index,
            temperature = record.temperature,
            humidity = record.humidity,
            "Cached reading"
        );
        Ok(())
    }

    /// The stored reading of `sensor_index` if it is fresh now.
    #[must_use]
    pub fn lookup(&self, sensor_index: usize) -> Option<CachedReading> {
        self.lookup_at(sensor_index, Utc::now())
    }

    /// The stored reading of `sensor_index` if it is fresh at `now`.
    ///
    /// Missing, unreadable and stale records are all reported as absent.
    #[must_use]
    pub fn lookup_at(&self, sensor_index: usize, now: DateTime<Utc>) -> Option<CachedReading> {
        let path = self.sensor_dir(sensor_index).join(READING_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cached reading");
                return None;
            }
        };
        let record: CacheRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cached reading");
                return None;
            }
        };

        let age_secs = (now.timestamp() - record.captured_at.timestamp()).max(0);
        let age = Duration::from_secs(age_secs.unsigned_abs());
        if age > self.max_age {
            debug!(sensor = sensor_index, age_secs, "Cached reading too old");
            return None;
        }
        Some(CachedReading { record, age })
    }

    /// Write a status file next to the cached reading.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] when the file cannot be written.
    pub fn write_status(&self, sensor_index: usize, name: &str, contents: &str) -> Result<(), CacheError> {
        self.write_file(sensor_index, name, contents.as_bytes())
    }

    /// Remove a status file; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] when the file exists but cannot be removed.
    pub fn remove_status(&self, sensor_index: usize, name: &str) -> Result<(), CacheError> {
        let path = self.sensor_dir(sensor_index).join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Contents of a status file, if present.
    #[must_use]
    pub fn read_status(&self, sensor_index: usize, name: &str) -> Option<String> {
        std::fs::read_to_string(self.sensor_dir(sensor_index).join(name)).ok()
    }

    fn write_file(&self, sensor_index: usize, name: &str, contents: &[u8]) -> Result<(), CacheError> {
        let dir = self.sensor_dir(sensor_index);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let target = dir.join(name);
        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        temp.write_all(contents)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| CacheError::io(temp.path(), e))?;
        temp.persist(&target)
            .map_err(|e| CacheError::io(&target, e.error))?;
        Ok(())
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_round_trip_and_age() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        cache.record(0, &CacheRecord::new(23.0, 35.0, at(1_700_000_000)))?;

        let cached = cache.lookup_at(0, at(1_700_000_200));
        let Some(cached) = cached else {
            panic!("expected a cached reading");
        };
        assert_eq!(cached.age, Duration::from_secs(200));
        assert!((cached.record.temperature - 23.0).abs() < f32::EPSILON);
        assert!((cached.record.humidity - 35.0).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn test_freshness_window() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        cache.record(1, &CacheRecord::new(20.0, 50.0, at(1_000)))?;

        assert!(cache.lookup_at(1, at(1_599)).is_some());
        assert!(cache.lookup_at(1, at(1_600)).is_some());
        assert!(cache.lookup_at(1, at(1_601)).is_none());
        Ok(())
    }

    #[test]
    fn test_future_record_has_zero_age() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        cache.record(0, &CacheRecord::new(20.0, 50.0, at(2_000)))?;
        let cached = cache.lookup_at(0, at(1_000)).map(|c| c.age);
        assert_eq!(cached, Some(Duration::ZERO));
        Ok(())
    }

    #[test]
    fn test_missing_and_corrupt_records() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        assert!(cache.lookup_at(3, at(0)).is_none());

        cache.write_status(3, READING_FILE, "{not json")?;
        assert!(cache.lookup_at(3, at(0)).is_none());
        Ok(())
    }

    #[test]
    fn test_record_format() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        cache.record(2, &CacheRecord::new(23.0, 35.0, at(1_700_000_000)))?;
        let raw = std::fs::read_to_string(dir.path().join("sensor2").join("reading.json"))
            .map_err(|e| CacheError::io(dir.path(), e))?;
        assert_eq!(
            raw,
            r#"{"temperature":23.0,"humidity":35.0,"captured_at":1700000000}"#
        );
        Ok(())
    }

    #[test]
    fn test_value_files() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        cache.record(0, &CacheRecord::new(23.0, 35.0, at(1_700_000_000)))?;
        assert_eq!(cache.read_status(0, TEMPERATURE_FILE).as_deref(), Some("23.0"));
        assert_eq!(cache.read_status(0, HUMIDITY_FILE).as_deref(), Some("35.0"));

        cache.record(0, &CacheRecord::new(-1.5, 40.34, at(1_700_000_060)))?;
        assert_eq!(cache.read_status(0, TEMPERATURE_FILE).as_deref(), Some("-1.5"));
        assert_eq!(cache.read_status(0, HUMIDITY_FILE).as_deref(), Some("40.3"));
        Ok(())
    }

    #[test]
    fn test_status_files() -> Result<(), CacheError> {
        let dir = TempDir::new().map_err(|e| CacheError::io(Path::new("tmp"), e))?;
        let cache = ReadingCache::new(dir.path());
        cache.write_status(0, "error", "No response from sensor")?;
        assert_eq!(
            cache.read_status(0, "error").as_deref(),
            Some("No response from sensor")
        );
        cache.remove_status(0, "error")?;
        cache.remove_status(0, "error")?;
        assert!(cache.read_status(0, "error").is_none());
        Ok(())
    }
}
