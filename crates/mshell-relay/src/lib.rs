//! mshell-relay: Relay between the pinned peer and the pinned target
//!
//! The relay accepts TCP connections, classifies each by its role byte,
//! authenticates it against the pinned key for that role and then runs a
//! peer worker or a target worker over the secure channel. Commands flow
//! from peers to the target through a bounded queue.

pub mod queue;
pub mod server;
pub mod state;

pub use queue::{Command, CommandQueue, DeliveryError};
pub use server::RelayServer;
pub use state::RelayState;
