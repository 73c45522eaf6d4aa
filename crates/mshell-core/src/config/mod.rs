//! Configuration management for mshell

mod endpoint;
mod relay;
mod schannel;
pub mod serde_utils;

pub use endpoint::{ClientConfig, ClientSettings, DaemonConfig, DaemonSettings, IdentityPaths};
pub use relay::{normalize_listen_address, RelayConfig, DEFAULT_QUEUE_CAPACITY};
pub use schannel::{SchannelConfig, DEFAULT_REKEY_AFTER};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/mshell")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}
