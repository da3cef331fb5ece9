//! Daemon configuration: shelf set, intake rate, courier delays, logging.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::{Shelf, Temperature};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("intake poisson mean must be positive, got {mean}")]
    NonPositiveRate { mean: f64 },
    #[error("pickup delays inverted: min {min}s > max {max}s")]
    InvertedDelays { min: u64, max: u64 },
    #[error("{temperature} shelf capacity must be positive")]
    ZeroCapacity { temperature: Temperature },
    #[error("{temperature} shelf decay rate factor must be non-negative, got {factor}")]
    NegativeFactor { temperature: Temperature, factor: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub intake: IntakeConfig,
    pub pickup: PickupConfig,
    pub shelves: Vec<ShelfConfig>,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intake: IntakeConfig::default(),
            pickup: PickupConfig::default(),
            shelves: default_shelves(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Mean orders submitted per second.
    pub poisson_mean_per_second: f64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            poisson_mean_per_second: 3.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupConfig {
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 2,
            max_delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfConfig {
    pub temperature: Temperature,
    pub capacity: usize,
    pub decay_rate_factor: f64,
}

fn default_shelves() -> Vec<ShelfConfig> {
    let mut shelves: Vec<ShelfConfig> = Temperature::REGULAR
        .iter()
        .map(|&temperature| ShelfConfig {
            temperature,
            capacity: 15,
            decay_rate_factor: 1.0,
        })
        .collect();
    shelves.push(ShelfConfig {
        temperature: Temperature::Overflow,
        capacity: 20,
        decay_rate_factor: 2.0,
    });
    shelves
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intake.poisson_mean_per_second <= 0.0 {
            return Err(ConfigError::NonPositiveRate {
                mean: self.intake.poisson_mean_per_second,
            });
        }
        if self.pickup.min_delay_secs > self.pickup.max_delay_secs {
            return Err(ConfigError::InvertedDelays {
                min: self.pickup.min_delay_secs,
                max: self.pickup.max_delay_secs,
            });
        }
        for shelf in &self.shelves {
            if shelf.capacity == 0 {
                return Err(ConfigError::ZeroCapacity {
                    temperature: shelf.temperature,
                });
            }
            if shelf.decay_rate_factor < 0.0 {
                return Err(ConfigError::NegativeFactor {
                    temperature: shelf.temperature,
                    factor: shelf.decay_rate_factor,
                });
            }
        }
        Ok(())
    }

    /// Materialize the configured shelf set with fresh ids. Completeness
    /// (one shelf per temperature) is the pod's concern.
    pub fn build_shelves(&self) -> Vec<Shelf> {
        self.shelves
            .iter()
            .map(|shelf| {
                Shelf::new(
                    Uuid::new_v4().to_string(),
                    shelf.capacity,
                    shelf.temperature,
                    shelf.decay_rate_factor,
                )
            })
            .collect()
    }
}
