//! Simulation configuration file: topology parameters plus engine knobs.

use crate::net::params::{DragonflyConfig, ParamError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Param(#[from] ParamError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub dragonfly: DragonflyConfig,
    /// Engine lookahead in nanoseconds.
    #[serde(default = "default_lookahead")]
    pub lookahead: f64,
    /// Mean of the exponential jitter on endpoint self events (ns).
    #[serde(default = "default_noise")]
    pub noise: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Simulated run horizon in seconds.
    #[serde(default = "default_end_time_secs")]
    pub end_time_secs: f64,
}

fn default_lookahead() -> f64 {
    0.5
}
fn default_noise() -> f64 {
    5.0
}
fn default_seed() -> u64 {
    0x5EED_C0DE
}
fn default_end_time_secs() -> f64 {
    300.0
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dragonfly: DragonflyConfig::default(),
            lookahead: default_lookahead(),
            noise: default_noise(),
            seed: default_seed(),
            end_time_secs: default_end_time_secs(),
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<SimConfig, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
