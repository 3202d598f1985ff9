use std::{fs, path::Path, time::Duration};

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::DebounceError;
use crate::gpio::{ActiveLevel, Pull};

pub const DEFAULT_QUIET_INTERVAL_MS: u64 = 50;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// How long a level must hold before it is accepted. Shared by every channel.
    #[serde(default = "default_quiet_interval_ms")]
    pub quiet_interval_ms: u64,
}

fn default_quiet_interval_ms() -> u64 {
    DEFAULT_QUIET_INTERVAL_MS
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quiet_interval_ms: DEFAULT_QUIET_INTERVAL_MS,
        }
    }
}

impl DebounceConfig {
    pub fn with_quiet_interval(quiet_interval: Duration) -> Self {
        Self {
            quiet_interval_ms: u64::try_from(quiet_interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.quiet_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContactConfig {
    pub name: String,
    pub chip: String,
    pub line: u32,
    #[serde(default)]
    pub active_level: ActiveLevel,
    #[serde(default)]
    pub pull: Pull,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub debounce: DebounceConfig,
    pub contacts: FxHashMap<u32, ContactConfig>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DebounceError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| DebounceError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, DebounceError> {
        serde_json::from_str(contents)
            .map_err(|e| DebounceError::Config(format!("Invalid config json: {e}")))
    }
}
