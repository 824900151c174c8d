//! Overlay configuration read from TOML
//!
//! Lookup order: `$STREAMPAD_CONFIG`, then `<config dir>/streampad/config.toml`.
//! Missing files fall back to defaults; every field is optional. The file is
//! never written.

use crate::controller::normalizer::NormalizerSettings;
use crate::controller::poller::PollerSettings;
use crate::notes::NoteSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_ENV: &str = "STREAMPAD_CONFIG";
const CONFIG_DIR: &str = "streampad";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: f32,
    pub height: f32,
    pub fps: u32,
    pub button_height: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 600.0,
            fps: 60,
            button_height: 80.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Keep reading the controller while the window is unfocused
    pub background_polling: bool,
    pub poll_rate_hz: u32,
    pub hat_button_debounce_ms: i64,
    pub stick_deadzone: f32,
    pub trigger_threshold: f32,
    pub reconcile_interval_ms: i64,
    /// Upper bound for joining the poller on exit
    pub shutdown_timeout_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            background_polling: true,
            poll_rate_hz: 120,
            hat_button_debounce_ms: 30,
            stick_deadzone: 0.5,
            trigger_threshold: 0.5,
            reconcile_interval_ms: 2000,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl InputConfig {
    pub fn normalizer_settings(&self) -> NormalizerSettings {
        NormalizerSettings {
            hat_button_debounce_ms: self.hat_button_debounce_ms,
            stick_deadzone: self.stick_deadzone,
            trigger_threshold: self.trigger_threshold,
        }
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            poll_rate_hz: self.poll_rate_hz,
        }
    }

    pub fn reconcile_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.reconcile_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct StreamPadConfig {
    pub display: DisplayConfig,
    pub input: InputConfig,
    pub notes: NoteSettings,
}

impl StreamPadConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Path the config is read from, if any can be determined
    pub fn path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|mut path| {
            path.push(CONFIG_DIR);
            path.push(CONFIG_FILE);
            path
        })
    }

    /// Loads from the default location, falling back to defaults without a file
    pub async fn load() -> Result<Self, ConfigError> {
        match Self::path() {
            Some(path) => Self::load_from(&path).await,
            None => {
                warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        debug!("{:?}", config);
        Ok(config)
    }
}
