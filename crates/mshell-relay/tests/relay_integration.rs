//! Relay integration tests
//!
//! Runs a relay on an ephemeral port and talks to it over real TCP with
//! secure channels, playing both the target and the peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use mshell_core::config::{RelayConfig, SchannelConfig};
use mshell_core::{PrivateKey, PublicKey, RelayIdentity, Schannel, SecureChannel};
use mshell_protocol::{Message, MessageType, Role};
use mshell_relay::{RelayServer, RelayState};

const STEP: Duration = Duration::from_secs(5);

struct TestRelay {
    address: SocketAddr,
    relay_key: PublicKey,
    peer_key: PrivateKey,
    target_key: PrivateKey,
    cancel: CancellationToken,
}

impl TestRelay {
    async fn start() -> Self {
        let relay_private = PrivateKey::generate();
        let peer_key = PrivateKey::generate();
        let target_key = PrivateKey::generate();
        let relay_key = relay_private.public_key();

        let config = RelayConfig {
            listen_address: "127.0.0.1:0".to_string(),
            classify_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let identity = RelayIdentity {
            private: relay_private,
            peer: peer_key.public_key(),
            target: target_key.public_key(),
        };

        let cancel = CancellationToken::new();
        let state = Arc::new(RelayState::new(config, identity));
        let server = RelayServer::bind(state, cancel.clone()).await.unwrap();
        let address = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });

        Self {
            address,
            relay_key,
            peer_key,
            target_key,
            cancel,
        }
    }

    async fn connect(&self, role: Role, key: &PrivateKey) -> Schannel<TcpStream> {
        let mut stream = TcpStream::connect(self.address).await.unwrap();
        stream.write_all(&[role.as_byte()]).await.unwrap();
        Schannel::dial(stream, key, &self.relay_key, &SchannelConfig::default())
            .await
            .unwrap()
    }

    async fn target(&self) -> Schannel<TcpStream> {
        self.connect(Role::Target, &self.target_key).await
    }

    async fn peer(&self) -> Schannel<TcpStream> {
        self.connect(Role::Peer, &self.peer_key).await
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_command_round_trip() {
    let relay = TestRelay::start().await;
    let mut target = relay.target().await;
    let mut peer = relay.peer().await;

    peer.send(b"echo hello").await.unwrap();

    let command = timeout(STEP, target.receive()).await.unwrap().unwrap();
    assert_eq!(command, Message::normal("echo hello"));
    target.send(b"hello\n").await.unwrap();

    let output = timeout(STEP, peer.receive()).await.unwrap().unwrap();
    assert_eq!(output, Message::normal("hello\n"));
}

#[tokio::test]
async fn test_command_waits_for_late_target() {
    let relay = TestRelay::start().await;
    let mut peer = relay.peer().await;
    peer.send(b"uptime").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut target = relay.target().await;

    let command = timeout(STEP, target.receive()).await.unwrap().unwrap();
    assert_eq!(command, Message::normal("uptime"));
    target.send(b"up 3 days").await.unwrap();

    let output = timeout(STEP, peer.receive()).await.unwrap().unwrap();
    assert_eq!(output.contents.as_ref(), b"up 3 days");
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let relay = TestRelay::start().await;

    let mut stream = TcpStream::connect(relay.address).await.unwrap();
    stream.write_all(b"x").await.unwrap();

    let mut buf = [0u8; 16];
    let read = timeout(STEP, stream.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_unpinned_peer_key_is_rejected() {
    let relay = TestRelay::start().await;
    let stranger = PrivateKey::generate();

    let mut stream = TcpStream::connect(relay.address).await.unwrap();
    stream.write_all(&[Role::Peer.as_byte()]).await.unwrap();
    let result = timeout(
        STEP,
        Schannel::dial(stream, &stranger, &relay.relay_key, &SchannelConfig::default()),
    )
    .await
    .unwrap();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_target_key_cannot_act_as_peer() {
    let relay = TestRelay::start().await;

    let mut stream = TcpStream::connect(relay.address).await.unwrap();
    stream.write_all(&[Role::Peer.as_byte()]).await.unwrap();
    let result = timeout(
        STEP,
        Schannel::dial(
            stream,
            &relay.target_key,
            &relay.relay_key,
            &SchannelConfig::default(),
        ),
    )
    .await
    .unwrap();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_target_loss_ends_peer_session() {
    let relay = TestRelay::start().await;
    let mut target = relay.target().await;
    let mut peer = relay.peer().await;

    peer.send(b"sleep 60").await.unwrap();
    timeout(STEP, target.receive()).await.unwrap().unwrap();
    drop(target);

    // The peer gets no output, only the end of its session
    match timeout(STEP, peer.receive()).await.unwrap() {
        Ok(message) => assert_eq!(message.kind, MessageType::Shutdown),
        Err(_) => {}
    }
}

#[tokio::test]
async fn test_key_rotation_is_transparent() {
    let relay = TestRelay::start().await;
    let mut target = relay.target().await;
    let mut peer = relay.peer().await;

    peer.rotate_keys().await.unwrap();
    peer.send(b"whoami").await.unwrap();

    let command = timeout(STEP, target.receive()).await.unwrap().unwrap();
    assert_eq!(command, Message::normal("whoami"));

    target.rotate_keys().await.unwrap();
    target.send(b"root\n").await.unwrap();

    let output = timeout(STEP, peer.receive()).await.unwrap().unwrap();
    assert_eq!(output, Message::normal("root\n"));
}

#[tokio::test]
async fn test_reconnecting_target_takes_over() {
    let relay = TestRelay::start().await;
    let mut old_target = relay.target().await;
    let mut new_target = relay.target().await;

    let closed = timeout(STEP, old_target.receive()).await.unwrap();
    assert!(matches!(closed, Ok(ref m) if m.kind == MessageType::Shutdown) || closed.is_err());

    let mut peer = relay.peer().await;
    peer.send(b"hostname").await.unwrap();

    let command = timeout(STEP, new_target.receive()).await.unwrap().unwrap();
    assert_eq!(command, Message::normal("hostname"));
    new_target.send(b"box\n").await.unwrap();

    let output = timeout(STEP, peer.receive()).await.unwrap().unwrap();
    assert_eq!(output, Message::normal("box\n"));
}
