//! Relay session management
//!
//! The daemon dials the relay, serves commands until the session ends, waits
//! the delay chosen by its retry policy and dials again.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use mshell_core::{ChannelError, Dialer, SecureChannel};
use mshell_protocol::MessageType;

use crate::exec::ShellExecutor;
use crate::retry::RetryPolicy;

const OUTPUT_TOO_LARGE: &str = "<failed to execute command: output too large>";

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The relay could not be reached or the handshake failed
    DialFailed,
    /// The relay sent Shutdown
    Shutdown,
    /// The channel failed or closed
    Transport,
    /// Output could not be sent back
    ReplyFailed,
}

/// Fatal daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The retry policy stopped granting reconnects
    #[error("gave up after {sessions} sessions")]
    RetriesExhausted { sessions: u32 },
}

/// Keeps the daemon connected to the relay
pub struct SessionManager<D, R> {
    dialer: D,
    retry: R,
    executor: ShellExecutor,
    cancel: CancellationToken,
}

impl<D, R> SessionManager<D, R>
where
    D: Dialer,
    R: RetryPolicy,
{
    /// Create a session manager
    pub fn new(dialer: D, retry: R, executor: ShellExecutor, cancel: CancellationToken) -> Self {
        Self {
            dialer,
            retry,
            executor,
            cancel,
        }
    }

    /// Run sessions until cancelled or the retry policy gives up
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        let mut sessions = 0u32;

        loop {
            let end = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                end = self.session() => end,
            };
            sessions = sessions.saturating_add(1);

            let Some(delay) = self.retry.next_delay() else {
                tracing::error!("Session ended ({:?}); not reconnecting", end);
                return Err(DaemonError::RetriesExhausted { sessions });
            };
            tracing::info!("Session ended ({:?}); reconnecting in {:?}", end, delay);

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn session(&self) -> SessionEnd {
        let mut channel = match self.dialer.dial().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Failed to connect to relay: {}", e);
                return SessionEnd::DialFailed;
            }
        };
        tracing::info!("Connected to relay");

        let end = serve(&mut channel, &self.executor).await;
        if let Err(e) = channel.close().await {
            tracing::trace!("Closing relay channel: {}", e);
        }
        end
    }
}

/// Answer commands on an established channel until the session ends
pub async fn serve<C>(channel: &mut C, executor: &ShellExecutor) -> SessionEnd
where
    C: SecureChannel,
{
    loop {
        let message = match channel.receive().await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Relay channel ended: {}", e);
                return SessionEnd::Transport;
            }
        };

        match message.kind {
            MessageType::Shutdown => {
                tracing::info!("Relay shut down the session");
                return SessionEnd::Shutdown;
            }
            MessageType::KeyExchange => {
                tracing::debug!("Relay rotated keys");
            }
            MessageType::Normal => {
                tracing::debug!("Running command ({} bytes)", message.contents.len());
                tracing::trace!("Command: {}", String::from_utf8_lossy(&message.contents));

                let output = match executor.execute(&message.contents).await {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::error!("Failed to execute command: {}", e);
                        e.to_payload()
                    }
                };

                let sent = match channel.send(&output).await {
                    Err(ChannelError::MessageTooLarge { size, .. }) => {
                        tracing::warn!("Output of {} bytes does not fit in a message", size);
                        channel.send(OUTPUT_TOO_LARGE.as_bytes()).await
                    }
                    sent => sent,
                };
                if let Err(e) = sent {
                    tracing::warn!("Failed to send output: {}", e);
                    return SessionEnd::ReplyFailed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mshell_core::config::SchannelConfig;
    use mshell_core::{MemoryChannel, PrivateKey, Schannel, MAX_MESSAGE_SIZE};
    use mshell_protocol::Message;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    use crate::retry::FixedDelay;

    /// Hands out scripted channels and records when each dial happened
    #[derive(Default)]
    struct ScriptedDialer {
        channels: Mutex<VecDeque<MemoryChannel>>,
        dials: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        type Channel = MemoryChannel;

        async fn dial(&self) -> Result<MemoryChannel, ChannelError> {
            self.dials.lock().unwrap().push(Instant::now());
            self.channels
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ChannelError::HandshakeFailed("refused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_failed_dials() {
        let dialer = ScriptedDialer::default();
        let dials = Arc::clone(&dialer.dials);
        let retry = FixedDelay::new(Duration::from_secs(10)).with_max_attempts(3);
        let mut manager = SessionManager::new(
            dialer,
            retry,
            ShellExecutor::new("sh"),
            CancellationToken::new(),
        );

        let result = manager.run().await;
        assert!(matches!(
            result,
            Err(DaemonError::RetriesExhausted { sessions: 4 })
        ));

        let dials = dials.lock().unwrap();
        assert_eq!(dials.len(), 4);
        for pair in dials.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_shutdown() {
        let (daemon_end, mut relay_end) = MemoryChannel::pair();
        let dialer = ScriptedDialer::default();
        dialer.channels.lock().unwrap().push_back(daemon_end);
        let dials = Arc::clone(&dialer.dials);

        relay_end.close().await.unwrap();

        let retry = FixedDelay::new(Duration::from_secs(10)).with_max_attempts(1);
        let mut manager = SessionManager::new(
            dialer,
            retry,
            ShellExecutor::new("sh"),
            CancellationToken::new(),
        );

        assert!(manager.run().await.is_err());
        let dials = dials.lock().unwrap();
        assert_eq!(dials.len(), 2);
        assert_eq!(dials[1] - dials[0], Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let cancel = CancellationToken::new();
        let mut manager = SessionManager::new(
            ScriptedDialer::default(),
            FixedDelay::new(Duration::from_secs(3600)),
            ShellExecutor::new("sh"),
            cancel.clone(),
        );

        let handle = tokio::spawn(async move { manager.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_serve_answers_commands() {
        let (mut daemon_end, mut relay_end) = MemoryChannel::pair();
        let executor = ShellExecutor::new("sh");
        let served = tokio::spawn(async move { serve(&mut daemon_end, &executor).await });

        relay_end.send(b"echo hello").await.unwrap();
        assert_eq!(relay_end.receive().await.unwrap(), Message::normal("hello\n"));

        relay_end.rotate_keys().await.unwrap();
        relay_end.send(b":").await.unwrap();
        assert_eq!(
            relay_end.receive().await.unwrap(),
            Message::normal("<no output>")
        );

        relay_end.close().await.unwrap();
        assert_eq!(served.await.unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn test_serve_reports_execution_failure() {
        let (mut daemon_end, mut relay_end) = MemoryChannel::pair();
        let executor = ShellExecutor::new("/nonexistent/mshell-test-shell");
        let served = tokio::spawn(async move { serve(&mut daemon_end, &executor).await });

        relay_end.send(b"echo hello").await.unwrap();
        let reply = relay_end.receive().await.unwrap();
        assert_eq!(reply.kind, MessageType::Normal);
        assert!(reply
            .contents
            .starts_with(b"<failed to execute command: "));

        drop(relay_end);
        assert_eq!(served.await.unwrap(), SessionEnd::Transport);
    }

    #[tokio::test]
    async fn test_oversized_output_keeps_session_open() {
        let daemon_key = PrivateKey::generate();
        let relay_key = PrivateKey::generate();
        let daemon_pub = daemon_key.public_key();
        let relay_pub = relay_key.public_key();
        let config = SchannelConfig::default();
        let (a, b) = tokio::io::duplex(1 << 20);

        let listen_config = config.clone();
        let relay = tokio::spawn(async move {
            Schannel::listen(b, &relay_key, &daemon_pub, &listen_config).await
        });
        let mut daemon_end = Schannel::dial(a, &daemon_key, &relay_pub, &config)
            .await
            .unwrap();
        let mut relay_end = relay.await.unwrap().unwrap();

        let executor = ShellExecutor::new("sh");
        let served = tokio::spawn(async move { serve(&mut daemon_end, &executor).await });

        relay_end.send(b"head -c 17000000 /dev/zero").await.unwrap();
        let reply = relay_end.receive().await.unwrap();
        assert_eq!(reply.kind, MessageType::Normal);
        assert_eq!(reply.contents.len(), MAX_MESSAGE_SIZE);
        assert!(reply.contents.ends_with(crate::exec::TRUNCATED_MARKER.as_bytes()));

        relay_end.send(b"echo still here").await.unwrap();
        assert_eq!(
            relay_end.receive().await.unwrap(),
            Message::normal("still here\n")
        );

        relay_end.close().await.unwrap();
        assert_eq!(served.await.unwrap(), SessionEnd::Shutdown);
    }
}
