//! In-process channel pair
//!
//! Carries `Message` values over tokio channels without any encryption. The
//! relay, daemon and client tests use it to script exact message sequences.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use mshell_protocol::{Message, MessageType};

use super::MAX_MESSAGE_SIZE;
use crate::error::ChannelError;
use crate::traits::SecureChannel;

/// One end of an in-process channel pair
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    closed: bool,
}

impl MemoryChannel {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        (
            Self {
                tx: a_tx,
                rx: a_rx,
                closed: false,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                closed: false,
            },
        )
    }

    /// Send any message, including control messages
    pub fn send_message(&mut self, message: Message) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.tx.send(message).map_err(|_| ChannelError::Closed)
    }

    /// Whether this end has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl SecureChannel for MemoryChannel {
    async fn send(&mut self, contents: &[u8]) -> Result<(), ChannelError> {
        if contents.len() > MAX_MESSAGE_SIZE {
            return Err(ChannelError::MessageTooLarge {
                size: contents.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.send_message(Message::normal(Bytes::copy_from_slice(contents)))
    }

    async fn receive(&mut self) -> Result<Message, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }

        let message = self.rx.recv().await.ok_or(ChannelError::Closed)?;
        if message.kind == MessageType::Shutdown {
            self.closed = true;
        }
        Ok(message)
    }

    async fn rotate_keys(&mut self) -> Result<(), ChannelError> {
        self.send_message(Message::key_exchange())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        let _ = self.tx.send(Message::shutdown());
        self.closed = true;
        Ok(())
    }
}
