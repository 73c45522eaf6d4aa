//! Identity keys
//!
//! Every process holds one X25519 private key and pins the public key of each
//! counterparty it will talk to. Keys live on disk as raw 32-byte files and
//! are loaded once at startup into an immutable identity value.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::config::IdentityPaths;
use crate::error::IdentityError;

/// Size of both private and public keys in bytes
pub const KEY_SIZE: usize = 32;

/// X25519 private key
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    /// Create from raw secret key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Raw secret key bytes
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Public half of this key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519PublicKey::from(&self.0).to_bytes())
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// Returns None for a non-contributory result (low-order public key).
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Option<[u8; KEY_SIZE]> {
        let shared = self.0.diffie_hellman(&X25519PublicKey::from(their_public.0));
        if shared.was_contributory() {
            Some(shared.to_bytes())
        } else {
            None
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&"<redacted>").finish()
    }
}

/// X25519 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Create from raw public key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw public key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short fingerprint for logs: first 8 bytes of SHA-256, hex encoded
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Relay identity: its own key plus the pinned peer and target keys
#[derive(Debug, Clone)]
pub struct RelayIdentity {
    /// Relay private key
    pub private: PrivateKey,
    /// Pinned public key of the peer (administrator)
    pub peer: PublicKey,
    /// Pinned public key of the target daemon
    pub target: PublicKey,
}

impl RelayIdentity {
    /// Load all three keys from disk
    pub fn load(private: &Path, peer: &Path, target: &Path) -> Result<Self, IdentityError> {
        Ok(Self {
            private: read_private_key(private)?,
            peer: read_public_key(peer)?,
            target: read_public_key(target)?,
        })
    }
}

/// Daemon or client identity: its own key plus the pinned relay key
#[derive(Debug, Clone)]
pub struct EndpointIdentity {
    /// Own private key
    pub private: PrivateKey,
    /// Pinned public key of the relay
    pub relay: PublicKey,
}

impl EndpointIdentity {
    /// Load the keys named by an `[identity]` config section
    pub fn load(paths: &IdentityPaths) -> Result<Self, IdentityError> {
        Ok(Self {
            private: read_private_key(&paths.private)?,
            relay: read_public_key(&paths.server)?,
        })
    }
}

/// Read a private key file
pub fn read_private_key(path: &Path) -> Result<PrivateKey, IdentityError> {
    read_key_file(path).map(PrivateKey::from_bytes)
}

/// Read a public key file
pub fn read_public_key(path: &Path) -> Result<PublicKey, IdentityError> {
    read_key_file(path).map(PublicKey::from_bytes)
}

fn read_key_file(path: &Path) -> Result<[u8; KEY_SIZE], IdentityError> {
    let mut file = File::open(path).map_err(|source| IdentityError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let mut key = [0u8; KEY_SIZE];
    file.read_exact(&mut key).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => IdentityError::TooShort {
            path: path.to_path_buf(),
            expected: KEY_SIZE,
        },
        _ => IdentityError::Io(e),
    })?;

    Ok(key)
}

/// Generate a keypair and write `<name>.key` and `<name>.pub` into `dir`
///
/// Returns the paths of the private and public key files. Existing files are
/// not overwritten.
pub fn write_keypair(dir: &Path, name: &str) -> Result<(PathBuf, PathBuf), IdentityError> {
    std::fs::create_dir_all(dir)?;

    let private_path = dir.join(format!("{}.key", name));
    let public_path = dir.join(format!("{}.pub", name));
    let key = PrivateKey::generate();

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(&private_path)?.write_all(&key.to_bytes())?;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&public_path)?
        .write_all(key.public_key().as_bytes())?;

    Ok((private_path, public_path))
}
