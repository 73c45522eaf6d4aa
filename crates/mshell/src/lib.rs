//! mshell: Interactive client for the mshell relay
//!
//! Sends one command line at a time to the target through the relay and
//! prints the output it returns.

pub mod commands;
pub mod output;
pub mod repl;
