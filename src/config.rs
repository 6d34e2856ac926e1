// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bluetooth::ServiceConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// RFCOMM channel the remote serial service listens on.
    pub rfcomm_channel: u8,

    /// Read buffer capacity in bytes.
    pub read_buffer_size: usize,

    /// Device to connect to when none is given on the command line.
    pub default_address: Option<String>,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            rfcomm_channel: 1,
            read_buffer_size: 1024,
            default_address: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bluetooth: BluetoothConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blueserial")
            .join("config.toml")
    }

    /// Load configuration from the default file or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        Ok(config)
    }

    /// Save configuration to the default file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Settings consumed by the serial service.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            read_buffer_size: self.bluetooth.read_buffer_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.bluetooth.rfcomm_channel, 1);
        assert_eq!(config.bluetooth.read_buffer_size, 1024);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[bluetooth]\nrfcomm_channel = 3\ndefault_address = \"AA:BB:CC:DD:EE:FF\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.bluetooth.rfcomm_channel, 3);
        assert_eq!(config.bluetooth.read_buffer_size, 1024);
        assert_eq!(
            config.bluetooth.default_address.as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn test_zero_buffer_is_clamped() {
        let mut config = Config::default();
        config.bluetooth.read_buffer_size = 0;
        assert_eq!(config.service_config().read_buffer_size, 1);
    }
}
