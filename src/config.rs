//! Chronicler configuration.
//!
//! Defines where archives live, how they are named, how often they rotate and
//! how often queued writes are drained to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lifecycle::RotationSettings;

pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 100;

/// Configuration for one chronicler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChroniclerConfig {
    /// Directory holding the archive files. Created on first write.
    pub directory: PathBuf,

    /// Filename prefix shared by every archive of this chronicler.
    pub log_name: String,

    /// How often the active archive is retired.
    pub rotation: RotationSettings,

    /// Delay between drains of the write queue absent an explicit flush.
    /// Default: 100 ms
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
}

fn default_batch_interval_ms() -> u64 {
    DEFAULT_BATCH_INTERVAL_MS
}

impl ChroniclerConfig {
    pub fn new(
        directory: impl Into<PathBuf>,
        log_name: impl Into<String>,
        rotation: RotationSettings,
    ) -> Self {
        Self {
            directory: directory.into(),
            log_name: log_name.into(),
            rotation,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
        }
    }

    #[must_use]
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    /// Load a JSON configuration file. The result is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: ChroniclerConfig = serde_json::from_str(&text)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::Config("directory must not be empty".to_string()));
        }
        if self.log_name.is_empty() {
            return Err(Error::Config("log_name must not be empty".to_string()));
        }
        if self.log_name == "." || self.log_name == ".." {
            return Err(Error::Config(format!("log_name {:?} is reserved", self.log_name)));
        }
        if self.log_name.contains(['/', '\\', '\0']) {
            return Err(Error::Config(format!(
                "log_name {:?} must not contain path separators",
                self.log_name
            )));
        }
        if self.batch_interval_ms == 0 {
            return Err(Error::Config("batch_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}
