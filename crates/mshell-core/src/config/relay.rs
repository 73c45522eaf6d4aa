//! Relay configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{default_config_dir, SchannelConfig};
use crate::error::ConfigError;

/// Default capacity of the relay command queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Configuration for the relay server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to listen on; a leading `:` means all interfaces
    pub listen_address: String,

    /// Relay identity private key
    pub private_key: PathBuf,

    /// Pinned public key of the peer
    pub peer_public_key: PathBuf,

    /// Pinned public key of the target
    pub target_public_key: PathBuf,

    /// Number of commands that may wait for the target
    pub queue_capacity: usize,

    /// How long a new connection may take to send its role byte
    #[serde(with = "duration_secs")]
    pub classify_timeout: Duration,

    /// Secure channel settings
    pub schannel: SchannelConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let config_dir = default_config_dir();

        Self {
            listen_address: ":6000".to_string(),
            private_key: config_dir.join("server.key"),
            peer_public_key: config_dir.join("peer.pub"),
            target_public_key: config_dir.join("client.pub"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            classify_timeout: Duration::from_secs(10),
            schannel: SchannelConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Socket address to bind, expanding `:port` to `0.0.0.0:port`
    pub fn bind_address(&self) -> String {
        normalize_listen_address(&self.listen_address)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.listen_address.is_empty() {
            return Err(ConfigError::Invalid("listen_address is empty".to_string()));
        }
        Ok(())
    }
}

/// Expand a port-only address (`:6000`) to bind on all interfaces
pub fn normalize_listen_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}
