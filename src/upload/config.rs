//! Upload manager configuration

use crate::error::{Result, UploadError};
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default admission budget: 10 MiB of declared size in flight
pub const DEFAULT_BYTE_BUDGET: u64 = 10 * 1024 * 1024;

/// Default delay before completed entries leave the trie
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 1000;

/// Configuration for an upload manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UploadConfig {
    /// New transfers are admitted only while the declared size of running
    /// transfers is below this many bytes
    pub byte_budget: u64,

    /// How long completed uploads stay visible after a drain (milliseconds)
    pub grace_period_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            byte_budget: DEFAULT_BYTE_BUDGET,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

impl UploadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_budget(mut self, bytes: u64) -> Self {
        self.byte_budget = bytes;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn grace_period_duration(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.byte_budget == 0 {
            return Err(UploadError::invalid_parameter(
                "byte_budget",
                "Byte budget must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: UploadConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            UploadError::config_error(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "byte budget {}, grace period {}ms",
            ByteSize::b(self.byte_budget),
            self.grace_period_ms
        )
    }
}
