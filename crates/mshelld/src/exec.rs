//! Command execution
//!
//! Each command line is written verbatim to a fresh temp file and run as a
//! script by the configured shell. Standard output and standard error share
//! one capture file, so the reply interleaves them as the shell wrote them.

use std::fs::File;
use std::io::{SeekFrom, Write};
use std::process::Stdio;

use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;

use mshell_core::MAX_MESSAGE_SIZE;

/// Reply sent when a command printed nothing
pub const NO_OUTPUT_PLACEHOLDER: &str = "<no output>";

/// Appended to output cut short to fit in one message
pub const TRUNCATED_MARKER: &str = "\n<output truncated>";

const SCRIPT_PREFIX: &str = "mshell-";

/// Errors that prevent a command from running
#[derive(Debug, Error)]
pub enum ExecError {
    /// The script or capture file could not be prepared
    #[error("temp file: {0}")]
    TempFile(#[source] std::io::Error),

    /// The shell could not be started
    #[error("could not start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    /// The captured output could not be read back
    #[error("reading output: {0}")]
    Capture(#[source] std::io::Error),
}

impl ExecError {
    /// Payload sent to the relay in place of output
    pub fn to_payload(&self) -> Bytes {
        Bytes::from(format!("<failed to execute command: {}>", self))
    }
}

/// Script file and the capture file its output goes to
struct Prepared {
    script: NamedTempFile,
    capture: File,
    stdout: File,
    stderr: File,
}

fn prepare(cmd_line: &[u8]) -> std::io::Result<Prepared> {
    let mut script = tempfile::Builder::new()
        .prefix(SCRIPT_PREFIX)
        .tempfile()?;
    script.write_all(cmd_line)?;
    script.flush()?;

    let capture = tempfile::tempfile()?;
    let stdout = capture.try_clone()?;
    let stderr = capture.try_clone()?;
    Ok(Prepared {
        script,
        capture,
        stdout,
        stderr,
    })
}

/// Runs command lines with a shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    max_output: usize,
}

impl ShellExecutor {
    /// Create an executor for the given shell
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            max_output: MAX_MESSAGE_SIZE,
        }
    }

    /// Limit replies to `max_output` bytes, marker included
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output.clamp(TRUNCATED_MARKER.len(), MAX_MESSAGE_SIZE);
        self
    }

    /// Shell used to run scripts
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Largest reply this executor produces
    pub fn max_output(&self) -> usize {
        self.max_output
    }

    /// Run one command line and return its combined output
    ///
    /// A non-zero exit status is not an error; whatever the command printed
    /// is returned. Empty output becomes [`NO_OUTPUT_PLACEHOLDER`]. Output
    /// longer than [`max_output`](Self::max_output) is cut and ends with
    /// [`TRUNCATED_MARKER`].
    pub async fn execute(&self, cmd_line: &[u8]) -> Result<Bytes, ExecError> {
        let cmd_line = cmd_line.to_vec();
        let Prepared {
            script,
            capture,
            stdout,
            stderr,
        } = tokio::task::spawn_blocking(move || prepare(&cmd_line))
            .await
            .map_err(|e| ExecError::TempFile(std::io::Error::other(e)))?
            .map_err(ExecError::TempFile)?;

        let status = Command::new(&self.shell)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| ExecError::Spawn {
                shell: self.shell.clone(),
                source,
            })?;

        if !status.success() {
            tracing::debug!("Command exited with {}", status);
        }

        // The script is removed here, before the capture is read
        drop(script);

        let mut capture = tokio::fs::File::from_std(capture);
        capture
            .seek(SeekFrom::Start(0))
            .await
            .map_err(ExecError::Capture)?;
        let mut output = Vec::new();
        capture
            .take(self.max_output as u64 + 1)
            .read_to_end(&mut output)
            .await
            .map_err(ExecError::Capture)?;

        if output.is_empty() {
            return Ok(Bytes::from_static(NO_OUTPUT_PLACEHOLDER.as_bytes()));
        }
        if output.len() > self.max_output {
            tracing::warn!(
                "Command output exceeds {} bytes; truncating",
                self.max_output
            );
            output.truncate(self.max_output - TRUNCATED_MARKER.len());
            output.extend_from_slice(TRUNCATED_MARKER.as_bytes());
        }
        Ok(Bytes::from(output))
    }
}
