//! Program configuration, read from a JSON file.
//!
//! Every section is optional. Frequencies may be given in Hz or as strings
//! with an SI prefix, e.g. `"3.6M"` or `"1.5 GHz"`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::calibration::StandardsConfig;
use crate::rf_math::parse_frequency;
use crate::sweep::SweepSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrequencyValue {
    Hz(u64),
    Text(String),
}

/// Accepts a frequency either as an integer number of Hz or as text
/// understood by [`parse_frequency`].
pub fn deserialize_frequency<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match FrequencyValue::deserialize(deserializer)? {
        FrequencyValue::Hz(f) => Ok(f),
        FrequencyValue::Text(s) => parse_frequency(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid frequency '{s}'"))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port the instrument is attached to.
    pub port: String,
    pub baud_rate: u32,
    /// Range check raw samples and re-read implausible data.
    pub validate_input: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            validate_input: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Calibration file loaded at startup.
    pub file: Option<PathBuf>,
    pub standards: StandardsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub sweep: SweepSettings,
    pub calibration: CalibrationConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Config, serde_json::Error> {
        serde_json::from_str(text)
    }
}
