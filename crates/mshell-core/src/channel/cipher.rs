//! Per-direction record sealing

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use sha2::{Digest, Sha256};

use crate::error::ChannelError;

const RATCHET_LABEL: &[u8] = b"mshell-schannel-rekey";

/// Poly1305 tag appended to every sealed record
pub(crate) const TAG_SIZE: usize = 16;

/// Traffic key and message counter for one direction of a session
///
/// The 96-bit nonce is four zero bytes followed by the big-endian counter, so
/// a key never seals two records with the same nonce.
pub(crate) struct DirectionalCipher {
    key: [u8; 32],
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl DirectionalCipher {
    pub(crate) fn new(key: [u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            key,
            counter: 0,
        }
    }

    pub(crate) fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let nonce = self.nonce()?;
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ChannelError::Encrypt)?;
        self.counter += 1;
        Ok(sealed)
    }

    pub(crate) fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let nonce = self.nonce()?;
        let opened = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| ChannelError::Decrypt)?;
        self.counter += 1;
        Ok(opened)
    }

    /// Replace the key with a one-way successor and restart the counter
    pub(crate) fn ratchet(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(RATCHET_LABEL);
        *self = Self::new(hasher.finalize().into());
    }

    fn nonce(&self) -> Result<[u8; 12], ChannelError> {
        if self.counter == u64::MAX {
            return Err(ChannelError::NonceExhausted);
        }
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());
        Ok(nonce)
    }
}
