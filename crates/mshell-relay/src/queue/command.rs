//! A queued command and its reply slot

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Why a command produced no output for its peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Forwarding the command line to the target failed
    #[error("failed to forward command to target")]
    SendFailed,

    /// The target connection failed while the command was in flight
    #[error("target connection lost")]
    TargetLost,

    /// The target closed its session while the command was in flight
    #[error("target shut down")]
    TargetShutdown,

    /// A newer target replaced the one holding the command
    #[error("target replaced by a new connection")]
    TargetDisplaced,

    /// The target session ended while the command was still queued
    #[error("target session ended before the command was dispatched")]
    Abandoned,

    /// The command was discarded without an answer
    #[error("command dropped without a reply")]
    Dropped,
}

/// Outcome delivered through a reply slot
pub type Reply = Result<Bytes, DeliveryError>;

/// A command line waiting for the target, plus the slot its output goes to
#[derive(Debug)]
pub struct Command {
    cmd_line: Bytes,
    reply: ReplySlot,
    cancel: CancellationToken,
}

impl Command {
    /// Create a command and the handle its peer waits on
    pub fn new(cmd_line: impl Into<Bytes>) -> (Self, PendingReply) {
        let (tx, rx) = oneshot::channel();
        let command = Self {
            cmd_line: cmd_line.into(),
            reply: ReplySlot { tx },
            cancel: CancellationToken::new(),
        };
        (command, PendingReply { rx })
    }

    /// Raw command line
    pub fn cmd_line(&self) -> &Bytes {
        &self.cmd_line
    }

    /// Token the owning peer cancels when it gives up on the command
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The peer cancelled the command or stopped waiting for it
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.reply.is_abandoned()
    }

    /// Split into the command line and the reply slot
    pub fn into_parts(self) -> (Bytes, ReplySlot) {
        (self.cmd_line, self.reply)
    }

    /// Fail the command without dispatching it
    pub fn fail(self, reason: DeliveryError) {
        self.reply.fail(reason);
    }
}

/// Write side of a reply; consumed by the first resolution
#[derive(Debug)]
pub struct ReplySlot {
    tx: oneshot::Sender<Reply>,
}

impl ReplySlot {
    /// Deliver the target's output
    pub fn resolve(self, output: Bytes) {
        if self.tx.send(Ok(output)).is_err() {
            tracing::trace!("Reply discarded, peer stopped waiting");
        }
    }

    /// Deliver a failure
    pub fn fail(self, reason: DeliveryError) {
        if self.tx.send(Err(reason)).is_err() {
            tracing::trace!("Failure discarded, peer stopped waiting: {}", reason);
        }
    }

    /// The waiting side is gone
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read side of a reply, held by the peer that enqueued the command
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    /// Wait for the output; a slot dropped unresolved yields `Dropped`
    pub async fn wait(self) -> Reply {
        self.rx.await.unwrap_or(Err(DeliveryError::Dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_output() {
        let (command, pending) = Command::new("echo hello");
        assert_eq!(command.cmd_line().as_ref(), b"echo hello");

        let (_, slot) = command.into_parts();
        slot.resolve(Bytes::from_static(b"hello\n"));

        assert_eq!(pending.wait().await, Ok(Bytes::from_static(b"hello\n")));
    }

    #[tokio::test]
    async fn test_fail_delivers_reason() {
        let (command, pending) = Command::new("uptime");
        command.fail(DeliveryError::TargetShutdown);

        assert_eq!(pending.wait().await, Err(DeliveryError::TargetShutdown));
    }

    #[tokio::test]
    async fn test_dropped_slot_reads_as_dropped() {
        let (command, pending) = Command::new("uptime");
        drop(command);

        assert_eq!(pending.wait().await, Err(DeliveryError::Dropped));
    }

    #[test]
    fn test_cancellation_is_visible() {
        let (command, pending) = Command::new("ls");
        assert!(!command.is_cancelled());

        command.cancel_token().cancel();
        assert!(command.is_cancelled());

        let (other, other_pending) = Command::new("ls");
        drop(other_pending);
        assert!(other.is_cancelled());
        drop(pending);
    }
}
