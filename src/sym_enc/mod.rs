//! Symmetric sealing of small payloads.
//!
//! Two places need a symmetric cipher:
//!
//! - the reference engine keeps every ciphertext in its store sealed under a
//!   per-handle key, so a store dump reveals nothing;
//! - the oracle returns a decrypted value sealed to the requester's ephemeral
//!   secret, and only the requester can open it.
//!
//! # Implementations
//!
//! - **[`Blake3XorEncryption`]**: XOR with a BLAKE3 XOF keystream
//!
//! # Example
//!
//! ```rust
//! use progress_ledger::{Blake3XorEncryption, SymmetricEncryption};
//!
//! let sealer = Blake3XorEncryption::new("progress-ledger doc example");
//! let secret = [7u8; 32];
//! let sealed = sealer.encrypt(&secret, b"75").unwrap();
//! assert_eq!(sealer.decrypt(&secret, &sealed).unwrap(), b"75");
//! ```

use core::fmt::Debug;

use blake3::Hasher;

use crate::Error;

/// Trait for symmetric encryption/decryption operations.
///
/// Implementations may use any keystream or AEAD construction; callers only
/// rely on `decrypt(secret, encrypt(secret, m)) == m`.
pub trait SymmetricEncryption: Debug + Send + Sync {
    /// Encrypts plaintext with the given secret.
    fn encrypt(&self, secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Decrypts ciphertext with the given secret.
    fn decrypt(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
}

/// BLAKE3-based XOR encryption.
///
/// The keystream is derived with BLAKE3 in key-derivation mode, using the
/// configured context string and the secret as key material, then extended
/// with the XOF reader. Provides confidentiality only; integrity of sealed
/// values comes from the surrounding protocol (handles are authenticated by
/// the store, oracle replies by the ephemeral secret).
#[derive(Debug, Clone)]
pub struct Blake3XorEncryption {
    /// Context string for BLAKE3 key derivation.
    context: &'static str,
}

impl Blake3XorEncryption {
    pub fn new(context: &'static str) -> Self {
        Self { context }
    }
}

impl Default for Blake3XorEncryption {
    fn default() -> Self {
        Self::new("progress-ledger 2024 payload seal")
    }
}

impl SymmetricEncryption for Blake3XorEncryption {
    fn encrypt(&self, secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if secret.is_empty() {
            return Err(Error::InvalidInput("empty sealing secret".into()));
        }
        let keystream = self.derive_keystream(secret, plaintext.len());
        Ok(xor_bytes(&keystream, plaintext))
    }

    fn decrypt(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        // XOR is its own inverse.
        self.encrypt(secret, ciphertext)
    }
}

impl Blake3XorEncryption {
    fn derive_keystream(&self, secret: &[u8], len: usize) -> Vec<u8> {
        if len == 0 {
            return Vec::new();
        }
        let mut hasher = Hasher::new_derive_key(self.context);
        hasher.update(secret);
        hasher.update(&(len as u64).to_le_bytes());
        let mut reader = hasher.finalize_xof();
        let mut keystream = vec![0u8; len];
        reader.fill(&mut keystream);
        keystream
    }
}

fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_secret_does_not_open() {
        let sealer = Blake3XorEncryption::default();
        let sealed = sealer.encrypt(&[1u8; 32], &42u32.to_le_bytes()).unwrap();
        let opened = sealer.decrypt(&[2u8; 32], &sealed).unwrap();
        assert_ne!(opened, 42u32.to_le_bytes());
    }

    #[test]
    fn contexts_are_separated() {
        let a = Blake3XorEncryption::new("context a");
        let b = Blake3XorEncryption::new("context b");
        let msg = [9u8; 16];
        assert_ne!(
            a.encrypt(&[3u8; 32], &msg).unwrap(),
            b.encrypt(&[3u8; 32], &msg).unwrap()
        );
    }

    #[test]
    fn empty_secret_rejected() {
        let sealer = Blake3XorEncryption::default();
        assert!(matches!(
            sealer.encrypt(&[], b"x"),
            Err(Error::InvalidInput(_))
        ));
    }
}
