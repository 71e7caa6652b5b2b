use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::habit::UserId;

pub const CONFIG_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("UTC offset of {0} minutes is out of range")]
    Offset(i32),
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("schedulife")
}

fn default_user_id() -> UserId {
    UserId::new(Uuid::new_v4().to_string())
}

fn default_version() -> u64 {
    CONFIG_VERSION
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("schedulife")
        .join("config.json")
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default = "default_user_id")]
    pub user_id: UserId,
    #[serde(default = "default_data_dir")]
    pub data_directory: PathBuf,
    /// Fixed offset used for every "today" computation.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            user_id: default_user_id(),
            data_directory: default_data_dir(),
            utc_offset_minutes: 0,
            debug_logging: false,
        }
    }
}

impl Config {
    /// Read the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = serde_json::from_str(&content)?;
                config.clock()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn clock(&self) -> Result<Clock, ConfigError> {
        Clock::with_offset_minutes(self.utc_offset_minutes).ok_or(ConfigError::Offset(self.utc_offset_minutes))
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_directory)
    }
}
