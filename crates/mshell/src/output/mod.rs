//! Terminal output for the client
//!
//! Command output is framed the same way for every reply. Status lines from
//! the client itself are colored and go to stderr, keeping stdout for the
//! session transcript.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

/// Frame one command's output for display
///
/// ```
/// let framed = mshell::output::format_command_output(b"hello\n");
/// assert_eq!(framed, b"output:\n------\nhello\n\n");
/// ```
pub fn format_command_output(contents: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(contents.len() + 16);
    framed.extend_from_slice(b"output:\n------\n");
    framed.extend_from_slice(contents);
    framed.push(b'\n');
    framed
}

fn print_tagged(mut out: impl Write, color: Color, tag: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(tag),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green
pub fn print_success(msg: &str) {
    print_tagged(std::io::stderr(), Color::Green, "✓ ", msg);
}

/// Print an error message in red
pub fn print_error(msg: &str) {
    print_tagged(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_tagged(std::io::stderr(), Color::Cyan, "ℹ ", msg);
}
