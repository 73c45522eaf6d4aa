//! Peer worker
//!
//! Turns each command line from the peer into a queued [`Command`], waits for
//! its output and sends the output back. While blocked on the queue or the
//! reply it keeps reading the peer channel, so a peer that disconnects or
//! shuts down cancels its command instead of leaving it for the target.
//! Lines read meanwhile wait in a backlog no longer than the queue; once it
//! is full the peer is not read until the current command completes.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use mshell_core::SecureChannel;
use mshell_protocol::MessageType;

use crate::queue::{Command, CommandQueue, DeliveryError};

/// Why a peer worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerExit {
    /// The peer sent Shutdown
    Shutdown,
    /// The peer channel failed or closed
    Transport,
    /// A command could not be delivered
    Delivery(DeliveryError),
}

/// Serves one peer connection
pub struct PeerWorker<C> {
    channel: C,
    queue: Arc<CommandQueue>,
    label: String,
    backlog: Backlog,
}

impl<C: SecureChannel> PeerWorker<C> {
    /// Create a worker for an established peer channel
    pub fn new(channel: C, queue: Arc<CommandQueue>, label: impl Into<String>) -> Self {
        Self {
            channel,
            backlog: Backlog::new(queue.capacity()),
            queue,
            label: label.into(),
        }
    }

    /// Serve until the peer leaves or a command fails, then close the channel
    pub async fn run(mut self) -> PeerExit {
        let exit = self.serve().await;
        if let Err(e) = self.channel.close().await {
            tracing::trace!("Closing peer channel {}: {}", self.label, e);
        }
        exit
    }

    async fn serve(&mut self) -> PeerExit {
        loop {
            let cmd_line = match self.backlog.lines.pop_front() {
                Some(line) => line,
                None => match self.next_command_line().await {
                    Ok(line) => line,
                    Err(exit) => return exit,
                },
            };

            tracing::debug!(
                "Peer {} sent a command ({} bytes)",
                self.label,
                cmd_line.len()
            );
            tracing::trace!("Command line: {}", String::from_utf8_lossy(&cmd_line));

            let (command, pending) = Command::new(cmd_line);
            let cancel = command.cancel_token();

            let enqueue = self.queue.enqueue(command);
            if let Err(exit) = watch_peer(&mut self.channel, &mut self.backlog, enqueue).await {
                cancel.cancel();
                return exit;
            }

            let reply = match watch_peer(&mut self.channel, &mut self.backlog, pending.wait()).await
            {
                Ok(reply) => reply,
                Err(exit) => {
                    cancel.cancel();
                    return exit;
                }
            };

            match reply {
                Ok(output) => {
                    if let Err(e) = self.channel.send(&output).await {
                        tracing::warn!("Failed to send output to peer {}: {}", self.label, e);
                        return PeerExit::Transport;
                    }
                    tracing::debug!("Output sent to peer {}", self.label);
                }
                Err(reason) => {
                    tracing::warn!("No output for peer {}: {}", self.label, reason);
                    return PeerExit::Delivery(reason);
                }
            }
        }
    }

    async fn next_command_line(&mut self) -> Result<Bytes, PeerExit> {
        loop {
            match self.channel.receive().await {
                Ok(message) => match message.kind {
                    MessageType::Normal => return Ok(message.contents),
                    MessageType::KeyExchange => {
                        tracing::debug!("Peer {} rotated keys", self.label);
                    }
                    MessageType::Shutdown => {
                        tracing::info!("Peer {} shut down its channel", self.label);
                        return Err(PeerExit::Shutdown);
                    }
                },
                Err(e) => {
                    tracing::debug!("Peer {} channel ended: {}", self.label, e);
                    return Err(PeerExit::Transport);
                }
            }
        }
    }
}

/// Command lines read ahead of the one being served
struct Backlog {
    lines: VecDeque<Bytes>,
    limit: usize,
}

impl Backlog {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.lines.len() >= self.limit
    }
}

/// Drive `fut` to completion while reading the peer channel
///
/// Command lines that arrive meanwhile are appended to `backlog`. The channel
/// is left unread while the backlog is full.
async fn watch_peer<C, F>(
    channel: &mut C,
    backlog: &mut Backlog,
    fut: F,
) -> Result<F::Output, PeerExit>
where
    C: SecureChannel,
    F: Future,
{
    tokio::pin!(fut);

    loop {
        tokio::select! {
            biased;

            output = &mut fut => return Ok(output),

            received = channel.receive(), if !backlog.is_full() => match received {
                Ok(message) => match message.kind {
                    MessageType::Normal => backlog.lines.push_back(message.contents),
                    MessageType::KeyExchange => {}
                    MessageType::Shutdown => return Err(PeerExit::Shutdown),
                },
                Err(_) => return Err(PeerExit::Transport),
            },
        }
    }
}
