//! Shared relay state

use std::sync::Arc;

use mshell_core::config::RelayConfig;
use mshell_core::RelayIdentity;

use crate::queue::CommandQueue;

/// State shared by every connection task
pub struct RelayState {
    /// Configuration
    pub config: RelayConfig,
    /// Relay key and the pinned peer and target keys
    pub identity: RelayIdentity,
    /// Commands waiting for the target
    pub queue: Arc<CommandQueue>,
}

impl RelayState {
    /// Create relay state with an empty queue
    pub fn new(config: RelayConfig, identity: RelayIdentity) -> Self {
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        Self {
            config,
            identity,
            queue,
        }
    }
}
