//! CLI command implementations

mod keygen;
mod shell;

pub use keygen::keygen_command;
pub use shell::shell_command;
