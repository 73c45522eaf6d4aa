//! Interactive command loop
//!
//! Reads one line at a time, sends it to the relay and prints the single
//! reply before prompting again. Generic over the channel and the terminal
//! streams so tests can script both sides.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use mshell_core::{ChannelError, SecureChannel};
use mshell_protocol::MessageType;

use crate::output::format_command_output;

/// Prompt printed before each line
pub const PROMPT: &str = "> ";

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    /// The user typed `exit` or `quit`
    Quit,
    /// Input ended
    EndOfInput,
    /// The relay closed the channel
    ServerShutdown,
}

/// Errors that end the loop abnormally
#[derive(Debug, Error)]
pub enum ReplError {
    /// The secure channel failed
    #[error("connection to relay failed: {0}")]
    Channel(#[from] ChannelError),

    /// Reading input or writing output failed
    #[error("terminal I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the loop until the user quits, input ends or the relay shuts down
pub async fn run<C, R, W>(channel: &mut C, input: R, output: &mut W) -> Result<ReplExit, ReplError>
where
    C: SecureChannel,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(ReplExit::EndOfInput);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            output.write_all(b"Bye.\n").await?;
            output.flush().await?;
            return Ok(ReplExit::Quit);
        }

        tracing::debug!("Sending command ({} bytes)", line.len());
        channel.send(line.as_bytes()).await?;

        loop {
            let message = channel.receive().await?;
            match message.kind {
                MessageType::Normal => {
                    output
                        .write_all(&format_command_output(&message.contents))
                        .await?;
                    break;
                }
                MessageType::KeyExchange => {
                    output.write_all(b"[*] server has rotated keys\n").await?;
                    output.flush().await?;
                }
                MessageType::Shutdown => {
                    output
                        .write_all(b"[*] server is shutting down channel\n")
                        .await?;
                    output.flush().await?;
                    return Ok(ReplExit::ServerShutdown);
                }
            }
        }
    }
}
