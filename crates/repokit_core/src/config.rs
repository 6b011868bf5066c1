//! Store and logging configuration.
//!
//! # Invariants
//! - Every field has a default, so partial documents deserialize.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Connection settings applied when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Enables `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Rolling file logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory receiving the log files.
    pub log_dir: String,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: String::new(),
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, log_dir: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }
}
