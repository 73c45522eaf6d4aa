//! mshelld: Target daemon for mshell
//!
//! The daemon keeps an outbound secure channel to the relay, runs each
//! command it receives with a shell and sends the output back. When the
//! session ends it waits a fixed delay and reconnects.

pub mod exec;
pub mod retry;
pub mod session;

pub use exec::{ExecError, ShellExecutor, NO_OUTPUT_PLACEHOLDER};
pub use retry::{FixedDelay, RetryPolicy};
pub use session::{serve, DaemonError, SessionEnd, SessionManager};
