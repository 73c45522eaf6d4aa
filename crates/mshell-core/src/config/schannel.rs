//! Secure channel tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Messages sent under one traffic key before rotating it
pub const DEFAULT_REKEY_AFTER: u64 = 1024;

/// Settings shared by every secure channel a process opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchannelConfig {
    /// Rotate the send key after this many messages (0 disables rotation)
    pub rekey_after: u64,

    /// Upper bound on connect plus handshake
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
}

impl Default for SchannelConfig {
    fn default() -> Self {
        Self {
            rekey_after: DEFAULT_REKEY_AFTER,
            handshake_timeout: Duration::from_secs(30),
        }
    }
}
