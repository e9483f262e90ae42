//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "HOTKEYD_CONFIG";

/// Queue sizes for one engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Raw hook events waiting for the matcher; overflow is reported as
    /// `events_dropped`
    pub raw_queue_capacity: usize,

    /// Matched events waiting for listeners
    pub dispatch_queue_capacity: usize,

    /// Error events buffered per `errors()` subscriber
    pub error_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            raw_queue_capacity: 256,
            dispatch_queue_capacity: 64,
            error_channel_capacity: 16,
        }
    }
}

/// A named combination the daemon listens for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub keys: Vec<String>,
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log every hotkey event at `info`
    pub verbose: bool,

    pub engine: EngineConfig,

    pub bindings: Vec<Binding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            engine: EngineConfig::default(),
            bindings: vec![Binding {
                name: "default".to_string(),
                keys: vec!["Control".into(), "Shift".into(), "Slash".into()],
            }],
        }
    }
}

impl Config {
    /// Load configuration from `$HOTKEYD_CONFIG` or the default path
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Parse configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Location of the config file
    pub fn path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("hotkeyd")
            .join("config.json"))
    }
}
