//! Daemon configuration
//!
//! TOML configuration for the NearShare daemon, loaded from
//! `~/.config/nearshare/daemon.toml` and created with defaults on
//! first start.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device identity
    pub device: DeviceConfig,

    /// Engine listen endpoint
    #[serde(default)]
    pub network: NetworkConfig,

    /// Storage paths
    pub paths: PathConfig,
}

/// Device identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name shown to peers
    pub name: String,

    /// Peer id (auto-generated and persisted if not set)
    #[serde(default)]
    pub peer_id: Option<String>,
}

/// Engine listen endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Host the engine listens on
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Port the engine listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
        }
    }
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Configuration directory
    pub config_dir: PathBuf,

    /// Data directory (transfer history database, peer id)
    pub data_dir: PathBuf,

    /// Directory incoming files land in
    pub download_dir: PathBuf,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    4411
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("nearshare");

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("nearshare");

        let download_dir = dirs::download_dir().unwrap_or_else(|| PathBuf::from("Downloads"));

        Self {
            device: DeviceConfig {
                name: whoami_device_name(),
                peer_id: None,
            },
            network: NetworkConfig::default(),
            paths: PathConfig {
                config_dir,
                data_dir,
                download_dir,
            },
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or from the default
    /// location, creating a default file if none exists
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::default_path(),
        };

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents).context("Failed to parse config")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("nearshare")
            .join("daemon.toml")
    }

    /// Save configuration to its config directory
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir).context("Failed to create config directory")?;

        let config_path = self.paths.config_dir.join("daemon.toml");
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir).context("Failed to create config directory")?;
        fs::create_dir_all(&self.paths.data_dir).context("Failed to create data directory")?;
        fs::create_dir_all(&self.paths.download_dir)
            .context("Failed to create download directory")?;
        Ok(())
    }

    /// Path of the transfer history database
    pub fn store_path(&self) -> PathBuf {
        self.paths.data_dir.join("transfers.db")
    }

    /// Path of the persisted auto-generated peer id
    pub fn peer_id_path(&self) -> PathBuf {
        self.paths.data_dir.join("peer_id")
    }

    /// Peer id from config or the persisted file, generating and
    /// persisting a fresh one when neither exists
    pub fn load_or_create_peer_id(&self) -> Result<String> {
        if let Some(id) = &self.device.peer_id {
            return Ok(id.clone());
        }

        let path = self.peer_id_path();
        if path.exists() {
            let id = fs::read_to_string(&path).context("Failed to read peer id")?;
            let id = id.trim().to_string();
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(&self.paths.data_dir)?;
        fs::write(&path, &id).context("Failed to persist peer id")?;
        Ok(id)
    }
}

fn whoami_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "NearShare Desktop".to_string())
}
