//! Secure channel over any byte stream

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use mshell_protocol::{Message, MessageType, Record, RecordCodec, RecordKind};

use super::cipher::DirectionalCipher;
use super::handshake::{self, SessionKeys};
use super::MAX_MESSAGE_SIZE;
use crate::config::SchannelConfig;
use crate::error::ChannelError;
use crate::identity::{PrivateKey, PublicKey};
use crate::traits::SecureChannel;

/// Lifecycle of an established channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Handshake complete, messages flow
    Active,
    /// Shutdown sent or received, or the stream ended
    Closed,
}

/// Authenticated, encrypted message channel bound to one pinned counterparty
pub struct Schannel<S> {
    framed: Framed<S, RecordCodec>,
    send: DirectionalCipher,
    recv: DirectionalCipher,
    rekey_after: u64,
    sent_since_rekey: u64,
    state: ChannelState,
}

impl<S> Schannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Establish a channel as the connecting side
    pub async fn dial(
        stream: S,
        local: &PrivateKey,
        remote: &PublicKey,
        config: &SchannelConfig,
    ) -> Result<Self, ChannelError> {
        let mut framed = Framed::new(stream, RecordCodec::new());
        let keys = tokio::time::timeout(
            config.handshake_timeout,
            handshake::initiate(&mut framed, local, remote),
        )
        .await
        .map_err(|_| ChannelError::HandshakeTimeout)??;

        tracing::debug!("Secure channel established with {:?}", remote);
        Ok(Self::established(framed, keys, config))
    }

    /// Establish a channel as the accepting side
    pub async fn listen(
        stream: S,
        local: &PrivateKey,
        remote: &PublicKey,
        config: &SchannelConfig,
    ) -> Result<Self, ChannelError> {
        let mut framed = Framed::new(stream, RecordCodec::new());
        let keys = tokio::time::timeout(
            config.handshake_timeout,
            handshake::respond(&mut framed, local, remote),
        )
        .await
        .map_err(|_| ChannelError::HandshakeTimeout)??;

        tracing::debug!("Secure channel established with {:?}", remote);
        Ok(Self::established(framed, keys, config))
    }

    fn established(
        framed: Framed<S, RecordCodec>,
        keys: SessionKeys,
        config: &SchannelConfig,
    ) -> Self {
        Self {
            framed,
            send: keys.send,
            recv: keys.recv,
            rekey_after: config.rekey_after,
            sent_since_rekey: 0,
            state: ChannelState::Active,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    async fn send_message(&mut self, message: &Message) -> Result<(), ChannelError> {
        if self.state == ChannelState::Closed {
            return Err(ChannelError::Closed);
        }

        let sealed = self.send.seal(&message.to_plaintext())?;
        if let Err(e) = self.framed.send(Record::new(RecordKind::Data, sealed)).await {
            self.state = ChannelState::Closed;
            return Err(e.into());
        }
        Ok(())
    }
}

fn check_size(contents: &[u8]) -> Result<(), ChannelError> {
    if contents.len() > MAX_MESSAGE_SIZE {
        return Err(ChannelError::MessageTooLarge {
            size: contents.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

#[async_trait]
impl<S> SecureChannel for Schannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, contents: &[u8]) -> Result<(), ChannelError> {
        check_size(contents)?;
        if self.rekey_after > 0 && self.sent_since_rekey >= self.rekey_after {
            self.rotate_keys().await?;
        }

        self.send_message(&Message::normal(Bytes::copy_from_slice(contents)))
            .await?;
        self.sent_since_rekey += 1;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Message, ChannelError> {
        if self.state == ChannelState::Closed {
            return Err(ChannelError::Closed);
        }

        // The only await point; everything after it runs to completion.
        let record = match self.framed.next().await {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                self.state = ChannelState::Closed;
                return Err(e.into());
            }
            None => {
                self.state = ChannelState::Closed;
                return Err(ChannelError::Closed);
            }
        };

        if record.kind != RecordKind::Data {
            self.state = ChannelState::Closed;
            return Err(ChannelError::UnexpectedRecord(record.kind));
        }

        let opened = match self.recv.open(&record.payload) {
            Ok(opened) => opened,
            Err(e) => {
                self.state = ChannelState::Closed;
                return Err(e);
            }
        };
        let message = Message::from_plaintext(Bytes::from(opened))?;

        match message.kind {
            MessageType::KeyExchange => {
                self.recv.ratchet();
                tracing::trace!("Receive key rotated");
            }
            MessageType::Shutdown => {
                self.state = ChannelState::Closed;
            }
            MessageType::Normal => {}
        }

        Ok(message)
    }

    async fn rotate_keys(&mut self) -> Result<(), ChannelError> {
        self.send_message(&Message::key_exchange()).await?;
        self.send.ratchet();
        self.sent_since_rekey = 0;
        tracing::debug!("Send key rotated");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.state == ChannelState::Closed {
            let _ = SinkExt::<Record>::close(&mut self.framed).await;
            return Ok(());
        }

        let result = self.send_message(&Message::shutdown()).await;
        self.state = ChannelState::Closed;
        let _ = SinkExt::<Record>::close(&mut self.framed).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    struct Pair {
        initiator: Schannel<DuplexStream>,
        listener: Schannel<DuplexStream>,
    }

    async fn establish(config: SchannelConfig) -> Pair {
        let client_key = PrivateKey::generate();
        let server_key = PrivateKey::generate();
        let client_pub = client_key.public_key();
        let server_pub = server_key.public_key();
        let (a, b) = duplex(64 * 1024);

        let listen_config = config.clone();
        let listener = tokio::spawn(async move {
            Schannel::listen(b, &server_key, &client_pub, &listen_config).await
        });
        let initiator = Schannel::dial(a, &client_key, &server_pub, &config)
            .await
            .unwrap();
        let listener = listener.await.unwrap().unwrap();

        Pair {
            initiator,
            listener,
        }
    }

    #[tokio::test]
    async fn test_messages_flow_both_ways() {
        let Pair {
            mut initiator,
            mut listener,
        } = establish(SchannelConfig::default()).await;

        initiator.send(b"echo hello").await.unwrap();
        let message = listener.receive().await.unwrap();
        assert_eq!(message, Message::normal("echo hello"));

        listener.send(b"hello\n").await.unwrap();
        let message = initiator.receive().await.unwrap();
        assert_eq!(message.kind, MessageType::Normal);
        assert_eq!(message.contents.as_ref(), b"hello\n");
    }

    #[tokio::test]
    async fn test_wrong_pinned_key_fails_handshake() {
        let client_key = PrivateKey::generate();
        let server_key = PrivateKey::generate();
        let impostor = PrivateKey::generate();
        let config = SchannelConfig::default();
        let server_pub = server_key.public_key();
        // Listener pins a key the initiator does not hold
        let pinned = impostor.public_key();
        let (a, b) = duplex(64 * 1024);

        let listen_config = config.clone();
        let listener =
            tokio::spawn(
                async move { Schannel::listen(b, &server_key, &pinned, &listen_config).await },
            );
        let dialed = Schannel::dial(a, &client_key, &server_pub, &config).await;

        let listened = listener.await.unwrap();
        assert!(matches!(listened, Err(ChannelError::HandshakeFailed(_))));
        assert!(dialed.is_err());
    }

    #[tokio::test]
    async fn test_handshake_times_out_on_silent_peer() {
        let key = PrivateKey::generate();
        let remote = PrivateKey::generate().public_key();
        let config = SchannelConfig {
            handshake_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        // Keep the other end open but never answer
        let (_silent, b) = duplex(1024);

        let result = Schannel::listen(b, &key, &remote, &config).await;
        assert!(matches!(result, Err(ChannelError::HandshakeTimeout)));
    }

    #[tokio::test]
    async fn test_automatic_rotation_surfaces_key_exchange() {
        let config = SchannelConfig {
            rekey_after: 2,
            ..Default::default()
        };
        let Pair {
            mut initiator,
            mut listener,
        } = establish(config).await;

        for line in ["one", "two", "three"] {
            initiator.send(line.as_bytes()).await.unwrap();
        }

        assert_eq!(listener.receive().await.unwrap(), Message::normal("one"));
        assert_eq!(listener.receive().await.unwrap(), Message::normal("two"));
        assert_eq!(listener.receive().await.unwrap(), Message::key_exchange());
        assert_eq!(listener.receive().await.unwrap(), Message::normal("three"));
    }

    #[tokio::test]
    async fn test_explicit_rotation_in_both_directions() {
        let Pair {
            mut initiator,
            mut listener,
        } = establish(SchannelConfig::default()).await;

        initiator.rotate_keys().await.unwrap();
        listener.rotate_keys().await.unwrap();
        initiator.send(b"after rotation").await.unwrap();
        listener.send(b"reply").await.unwrap();

        assert_eq!(listener.receive().await.unwrap(), Message::key_exchange());
        assert_eq!(
            listener.receive().await.unwrap(),
            Message::normal("after rotation")
        );
        assert_eq!(initiator.receive().await.unwrap(), Message::key_exchange());
        assert_eq!(initiator.receive().await.unwrap(), Message::normal("reply"));
    }

    #[tokio::test]
    async fn test_close_delivers_shutdown() {
        let Pair {
            mut initiator,
            mut listener,
        } = establish(SchannelConfig::default()).await;

        initiator.close().await.unwrap();
        assert_eq!(initiator.state(), ChannelState::Closed);
        assert!(matches!(
            initiator.send(b"late").await,
            Err(ChannelError::Closed)
        ));

        assert_eq!(listener.receive().await.unwrap(), Message::shutdown());
        assert_eq!(listener.state(), ChannelState::Closed);
        assert!(matches!(
            listener.receive().await,
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_without_closing() {
        let Pair {
            mut initiator,
            mut listener,
        } = establish(SchannelConfig::default()).await;

        let oversized = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            listener.send(&oversized).await,
            Err(ChannelError::MessageTooLarge { .. })
        ));
        assert_eq!(listener.state(), ChannelState::Active);

        listener.send(b"still open").await.unwrap();
        assert_eq!(
            initiator.receive().await.unwrap(),
            Message::normal("still open")
        );
    }

    #[tokio::test]
    async fn test_dropped_stream_is_closed() {
        let Pair {
            initiator,
            mut listener,
        } = establish(SchannelConfig::default()).await;

        drop(initiator);
        assert!(matches!(
            listener.receive().await,
            Err(ChannelError::Closed)
        ));
    }
}
