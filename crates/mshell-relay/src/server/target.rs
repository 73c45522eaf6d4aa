//! Target worker
//!
//! Takes commands off the queue one at a time, forwards each to the target
//! and resolves its reply with the target's output.

use mshell_core::{ChannelError, SecureChannel};
use mshell_protocol::{Message, MessageType};
use tokio_util::sync::CancellationToken;

use crate::queue::{Command, DeliveryError, ReplySlot, TargetLease};

/// Why a target worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetExit {
    /// The target sent Shutdown
    Shutdown,
    /// The target channel failed or closed
    Transport,
    /// A newer target took over the queue
    Displaced,
    /// The command queue went away
    QueueClosed,
}

/// Serves one target connection
pub struct TargetWorker<C> {
    channel: C,
    lease: TargetLease,
    displaced: CancellationToken,
    label: String,
}

impl<C: SecureChannel> TargetWorker<C> {
    /// Create a worker for an established target channel
    pub fn new(channel: C, lease: TargetLease, label: impl Into<String>) -> Self {
        let displaced = lease.displacement_token();
        Self {
            channel,
            lease,
            displaced,
            label: label.into(),
        }
    }

    /// Serve until the target leaves or is displaced
    ///
    /// Unless displaced, commands still queued are failed on exit since
    /// nothing will dispatch them until a target registers again. The queue
    /// is released before the channel is closed.
    pub async fn run(mut self) -> TargetExit {
        let exit = self.serve().await;
        let Self {
            mut channel,
            mut lease,
            label,
            ..
        } = self;

        if exit != TargetExit::Displaced {
            let failed = lease.fail_pending(DeliveryError::Abandoned);
            if failed > 0 {
                tracing::warn!(
                    "Target {} left with {} queued commands; failed them",
                    label,
                    failed
                );
            }
        }
        drop(lease);

        if let Err(e) = channel.close().await {
            tracing::trace!("Closing target channel {}: {}", label, e);
        }
        exit
    }

    async fn serve(&mut self) -> TargetExit {
        loop {
            // The channel is read while idle so a target that leaves
            // releases the queue before the next command arrives.
            let command = tokio::select! {
                biased;

                _ = self.displaced.cancelled() => return TargetExit::Displaced,

                received = self.channel.receive() => match self.idle_message(received) {
                    Some(exit) => return exit,
                    None => continue,
                },

                next = self.lease.next_command() => match next {
                    Some(command) => command,
                    None => return TargetExit::QueueClosed,
                },
            };

            if command.is_cancelled() {
                tracing::debug!("Skipping command its peer gave up on");
                continue;
            }

            if let Err(exit) = self.dispatch(command).await {
                return exit;
            }
        }
    }

    /// Handle a message that arrived with no command in flight
    fn idle_message(&self, received: Result<Message, ChannelError>) -> Option<TargetExit> {
        match received {
            Ok(message) => match message.kind {
                MessageType::Normal => {
                    tracing::warn!(
                        "Target {} sent {} bytes with no command in flight; ignored",
                        self.label,
                        message.contents.len()
                    );
                    None
                }
                MessageType::KeyExchange => {
                    tracing::debug!("Target {} rotated keys", self.label);
                    None
                }
                MessageType::Shutdown => {
                    tracing::info!("Target {} shut down its channel while idle", self.label);
                    Some(TargetExit::Shutdown)
                }
            },
            Err(e) => {
                tracing::info!("Lost idle target {}: {}", self.label, e);
                Some(TargetExit::Transport)
            }
        }
    }

    /// Forward one command and resolve its reply
    async fn dispatch(&mut self, command: Command) -> Result<(), TargetExit> {
        let (cmd_line, reply) = command.into_parts();

        let sent = tokio::select! {
            biased;

            _ = self.displaced.cancelled() => {
                reply.fail(DeliveryError::TargetDisplaced);
                return Err(TargetExit::Displaced);
            }

            sent = self.channel.send(&cmd_line) => sent,
        };
        if let Err(e) = sent {
            tracing::warn!("Failed to forward command to target {}: {}", self.label, e);
            reply.fail(DeliveryError::SendFailed);
            return Err(TargetExit::Transport);
        }
        tracing::debug!("Command forwarded to target {}", self.label);

        self.await_output(reply).await
    }

    async fn await_output(&mut self, reply: ReplySlot) -> Result<(), TargetExit> {
        loop {
            let received = tokio::select! {
                biased;

                _ = self.displaced.cancelled() => {
                    reply.fail(DeliveryError::TargetDisplaced);
                    return Err(TargetExit::Displaced);
                }

                received = self.channel.receive() => received,
            };

            match received {
                Ok(message) => match message.kind {
                    MessageType::Normal => {
                        tracing::debug!(
                            "Target {} returned {} bytes",
                            self.label,
                            message.contents.len()
                        );
                        reply.resolve(message.contents);
                        return Ok(());
                    }
                    MessageType::KeyExchange => {
                        tracing::debug!("Target {} rotated keys", self.label);
                    }
                    MessageType::Shutdown => {
                        tracing::info!("Target {} shut down its channel", self.label);
                        reply.fail(DeliveryError::TargetShutdown);
                        return Err(TargetExit::Shutdown);
                    }
                },
                Err(e) => {
                    tracing::warn!("Lost target {}: {}", self.label, e);
                    reply.fail(DeliveryError::TargetLost);
                    return Err(TargetExit::Transport);
                }
            }
        }
    }
}
