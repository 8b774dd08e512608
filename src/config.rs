//! # Configuration Management Module
//!
//! Persistent node settings stored in platform-appropriate locations.
//! Handles loading, saving, validating and providing defaults.
//!
//! ## Settings
//! - Identity and broker: `device_id`, `broker_host`, `broker_port`, credentials
//! - Topics: `command_topic`, optional `status_topic` override
//! - Acquisition: `samples_per_frame`, `channel_count`, `sample_interval_ms`
//! - Pipeline: `queue_capacity`, `push_timeout_ms`, `writer_poll_ms`
//! - Reporting: `status_interval_ms`, inbox/outbox capacities
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/holdlog/config.toml
//! - Linux: ~/.config/holdlog/config.toml
//! - Windows: %APPDATA%\holdlog\config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device_id: String,
    pub broker_host: String,
    pub broker_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub command_topic: String,
    /// Defaults to `pico/<device_id>/status`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_topic: Option<String>,
    pub storage_root: PathBuf,
    pub samples_per_frame: usize,
    pub channel_count: usize,
    pub sample_interval_ms: u64,
    pub queue_capacity: usize,
    pub push_timeout_ms: u64,
    pub writer_poll_ms: u64,
    pub status_interval_ms: u64,
    pub inbox_capacity: usize,
    pub outbox_capacity: usize,
    pub loop_yield_us: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: "pico1".to_string(),
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 7200,
            command_topic: "pico/all/cmd".to_string(),
            status_topic: None,
            storage_root: PathBuf::from("sd"),
            samples_per_frame: 100,
            channel_count: 4,
            sample_interval_ms: 20,
            queue_capacity: 16,
            push_timeout_ms: 1000,
            writer_poll_ms: 10,
            status_interval_ms: 1000,
            inbox_capacity: 32,
            outbox_capacity: 64,
            loop_yield_us: 500,
            reconnect_delay_ms: 5000,
        }
    }
}

impl Config {
    /// Get the path to the config file
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("holdlog")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load config from `path`, writing defaults there when the file is missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let config: Config = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::ParseFailed)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                config
            }
            Err(e) => return Err(ConfigError::ReadFailed(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("samples_per_frame", self.samples_per_frame as u64),
            ("channel_count", self.channel_count as u64),
            ("sample_interval_ms", self.sample_interval_ms),
            ("queue_capacity", self.queue_capacity as u64),
            ("push_timeout_ms", self.push_timeout_ms),
            ("writer_poll_ms", self.writer_poll_ms),
            ("status_interval_ms", self.status_interval_ms),
            ("inbox_capacity", self.inbox_capacity as u64),
            ("outbox_capacity", self.outbox_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device_id must not be empty".into()));
        }
        if self.command_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("command_topic must not be empty".into()));
        }
        Ok(())
    }

    pub fn status_topic(&self) -> String {
        self.status_topic
            .clone()
            .unwrap_or_else(|| format!("pico/{}/status", self.device_id))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn writer_poll(&self) -> Duration {
        Duration::from_millis(self.writer_poll_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn loop_yield(&self) -> Duration {
        Duration::from_micros(self.loop_yield_us)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
