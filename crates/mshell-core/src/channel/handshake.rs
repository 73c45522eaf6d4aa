//! Mutually pinned key agreement
//!
//! Both sides already know each other's static public key, so the handshake
//! is a single exchange of ephemeral keys followed by a key confirmation:
//!
//! 1. Initiator → Listener: `Hello(initiator ephemeral)`
//! 2. Listener → Initiator: `Hello(listener ephemeral)`
//! 3. Both derive a chaining key from three Diffie-Hellman results
//!    (ephemeral-ephemeral, initiator static-listener ephemeral, initiator
//!    ephemeral-listener static) and split it into two direction keys.
//! 4. Initiator → Listener: `Confirm`, sealed under the initiator's send key
//! 5. Listener → Initiator: `Confirm`, sealed under the listener's send key
//!
//! A side holding a different static key than the one pinned by its
//! counterparty derives different keys, so its `Confirm` fails to open.

use futures::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use mshell_protocol::{Record, RecordCodec, RecordKind};

use super::cipher::DirectionalCipher;
use crate::error::ChannelError;
use crate::identity::{PrivateKey, PublicKey, KEY_SIZE};

const PROTOCOL_LABEL: &[u8] = b"mshell-schannel-v1";
const INITIATOR_TO_LISTENER: &[u8] = b"initiator->listener";
const LISTENER_TO_INITIATOR: &[u8] = b"listener->initiator";
const INITIATOR_CONFIRM: &[u8] = b"mshell confirm initiator";
const LISTENER_CONFIRM: &[u8] = b"mshell confirm listener";

/// Traffic ciphers produced by a completed handshake
pub(crate) struct SessionKeys {
    pub(crate) send: DirectionalCipher,
    pub(crate) recv: DirectionalCipher,
}

/// Everything that feeds the chaining key, in initiator/listener order
struct Transcript {
    initiator_static: PublicKey,
    listener_static: PublicKey,
    initiator_ephemeral: PublicKey,
    listener_ephemeral: PublicKey,
    ee: [u8; KEY_SIZE],
    se: [u8; KEY_SIZE],
    es: [u8; KEY_SIZE],
}

impl Transcript {
    fn chaining_key(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(PROTOCOL_LABEL);
        hasher.update(self.initiator_static.as_bytes());
        hasher.update(self.listener_static.as_bytes());
        hasher.update(self.initiator_ephemeral.as_bytes());
        hasher.update(self.listener_ephemeral.as_bytes());
        hasher.update(self.ee);
        hasher.update(self.se);
        hasher.update(self.es);
        hasher.finalize().into()
    }
}

fn derive(chaining_key: &[u8; 32], label: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(chaining_key);
    hasher.update(label);
    hasher.finalize().into()
}

fn dh(local: &PrivateKey, remote: &PublicKey) -> Result<[u8; KEY_SIZE], ChannelError> {
    local
        .diffie_hellman(remote)
        .ok_or_else(|| ChannelError::HandshakeFailed("non-contributory key".to_string()))
}

/// Run the initiator side of the handshake
pub(crate) async fn initiate<S>(
    framed: &mut Framed<S, RecordCodec>,
    local: &PrivateKey,
    listener: &PublicKey,
) -> Result<SessionKeys, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ephemeral = PrivateKey::generate();
    send_hello(framed, &ephemeral).await?;
    let listener_ephemeral = expect_hello(framed).await?;

    let transcript = Transcript {
        initiator_static: local.public_key(),
        listener_static: *listener,
        initiator_ephemeral: ephemeral.public_key(),
        listener_ephemeral,
        ee: dh(&ephemeral, &listener_ephemeral)?,
        se: dh(local, &listener_ephemeral)?,
        es: dh(&ephemeral, listener)?,
    };
    let chaining_key = transcript.chaining_key();

    let mut keys = SessionKeys {
        send: DirectionalCipher::new(derive(&chaining_key, INITIATOR_TO_LISTENER)),
        recv: DirectionalCipher::new(derive(&chaining_key, LISTENER_TO_INITIATOR)),
    };

    send_confirm(framed, &mut keys.send, INITIATOR_CONFIRM).await?;
    expect_confirm(framed, &mut keys.recv, LISTENER_CONFIRM).await?;

    Ok(keys)
}

/// Run the listener side of the handshake
pub(crate) async fn respond<S>(
    framed: &mut Framed<S, RecordCodec>,
    local: &PrivateKey,
    initiator: &PublicKey,
) -> Result<SessionKeys, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let initiator_ephemeral = expect_hello(framed).await?;
    let ephemeral = PrivateKey::generate();
    send_hello(framed, &ephemeral).await?;

    let transcript = Transcript {
        initiator_static: *initiator,
        listener_static: local.public_key(),
        initiator_ephemeral,
        listener_ephemeral: ephemeral.public_key(),
        ee: dh(&ephemeral, &initiator_ephemeral)?,
        se: dh(&ephemeral, initiator)?,
        es: dh(local, &initiator_ephemeral)?,
    };
    let chaining_key = transcript.chaining_key();

    let mut keys = SessionKeys {
        send: DirectionalCipher::new(derive(&chaining_key, LISTENER_TO_INITIATOR)),
        recv: DirectionalCipher::new(derive(&chaining_key, INITIATOR_TO_LISTENER)),
    };

    expect_confirm(framed, &mut keys.recv, INITIATOR_CONFIRM).await?;
    send_confirm(framed, &mut keys.send, LISTENER_CONFIRM).await?;

    Ok(keys)
}

async fn send_hello<S>(
    framed: &mut Framed<S, RecordCodec>,
    ephemeral: &PrivateKey,
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let public = ephemeral.public_key();
    framed
        .send(Record::new(RecordKind::Hello, public.as_bytes().to_vec()))
        .await?;
    Ok(())
}

async fn expect_hello<S>(framed: &mut Framed<S, RecordCodec>) -> Result<PublicKey, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let record = next_record(framed, RecordKind::Hello).await?;
    let bytes: [u8; KEY_SIZE] = record.payload.as_ref().try_into().map_err(|_| {
        ChannelError::HandshakeFailed(format!(
            "hello carried {} bytes, expected {}",
            record.payload.len(),
            KEY_SIZE
        ))
    })?;
    Ok(PublicKey::from_bytes(bytes))
}

async fn send_confirm<S>(
    framed: &mut Framed<S, RecordCodec>,
    cipher: &mut DirectionalCipher,
    label: &[u8],
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sealed = cipher.seal(label)?;
    framed.send(Record::new(RecordKind::Confirm, sealed)).await?;
    Ok(())
}

async fn expect_confirm<S>(
    framed: &mut Framed<S, RecordCodec>,
    cipher: &mut DirectionalCipher,
    label: &[u8],
) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let record = next_record(framed, RecordKind::Confirm).await?;
    match cipher.open(&record.payload) {
        Ok(opened) if opened == label => Ok(()),
        _ => Err(ChannelError::HandshakeFailed(
            "key confirmation failed; counterparty key does not match the pinned key".to_string(),
        )),
    }
}

async fn next_record<S>(
    framed: &mut Framed<S, RecordCodec>,
    expected: RecordKind,
) -> Result<Record, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let record = framed.next().await.ok_or_else(|| {
        ChannelError::HandshakeFailed("connection closed during handshake".to_string())
    })??;

    if record.kind != expected {
        return Err(ChannelError::UnexpectedRecord(record.kind));
    }
    Ok(record)
}
