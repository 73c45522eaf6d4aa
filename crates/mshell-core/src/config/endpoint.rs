//! Daemon and client configuration
//!
//! Both files share an `[identity]` section naming the process's private key
//! and the pinned relay public key, plus a program section with the relay
//! address:
//!
//! ```toml
//! [identity]
//! private = "/etc/mshell/mshelld.key"
//! server = "/etc/mshell/server.pub"
//!
//! [mshelld]
//! address = "relay.example.net:6000"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::SchannelConfig;

/// `[identity]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityPaths {
    /// Own private key
    pub private: PathBuf,
    /// Pinned relay public key
    pub server: PathBuf,
}

/// Configuration for the target daemon (`mshelld`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Key files
    pub identity: IdentityPaths,

    /// Daemon settings
    pub mshelld: DaemonSettings,

    /// Secure channel settings
    #[serde(default)]
    pub schannel: SchannelConfig,
}

/// `[mshelld]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Relay address
    pub address: String,

    /// Wait between a session ending and the next connection attempt
    #[serde(with = "duration_secs", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,

    /// Give up after this many sessions (0 = never)
    #[serde(default)]
    pub max_reconnects: u32,

    /// Shell interpreter used to run received scripts
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_shell() -> String {
    "sh".to_string()
}

/// Configuration for the interactive peer client (`mshell`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Key files
    pub identity: IdentityPaths,

    /// Client settings
    pub mshell: ClientSettings,

    /// Secure channel settings
    #[serde(default)]
    pub schannel: SchannelConfig,
}

/// `[mshell]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Relay address
    pub address: String,
}
