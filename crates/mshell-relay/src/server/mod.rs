//! Relay server: connection classification and the per-role workers

mod listener;
mod peer;
mod target;

pub use listener::{read_role_byte, RelayServer};
pub use peer::{PeerExit, PeerWorker};
pub use target::{TargetExit, TargetWorker};
