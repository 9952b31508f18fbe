//! Encryption engine interfaces.
//!
//! The homomorphic cryptosystem itself lives outside this crate. Two traits
//! describe what the rest of the crate needs from it:
//!
//! - [`EncryptionEngine`]: the client and oracle side. Encrypts plaintexts
//!   into bound [`EncryptedInput`]s, mints ephemeral keypairs, and performs
//!   user decryption once an [`AuthorizationGrant`] checks out.
//! - [`FheExecutor`]: the ledger co-processor side. Verifies input proofs,
//!   adds ciphertexts homomorphically, and maintains per-handle ACLs.
//!
//! An engine advertises what it supports through [`Capabilities`]; the
//! controller negotiates once when the engine is attached instead of probing
//! per call.
//!
//! [`memory::InMemoryEngine`] implements both traits over one store and
//! serves as the reference backend for tests, benches and demos.

use core::fmt::{self, Debug};
use std::collections::BTreeMap;

use zeroize::Zeroize;

use crate::{
    auth::grant::AuthorizationGrant,
    errors::{Error, LedgerError, OracleError},
    sym_enc::{Blake3XorEncryption, SymmetricEncryption},
    types::{Address, CiphertextHandle, EncryptedInput},
};

pub mod memory;

const EPHEMERAL_PUBLIC_CONTEXT: &str = "progress-ledger 2024 ephemeral public key";
const REENCRYPT_CONTEXT: &str = "progress-ledger 2024 oracle reencryption";

/// Optional features an engine may expose.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    pub encrypt: bool,
    pub keypair: bool,
    pub user_decrypt: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        encrypt: true,
        keypair: true,
        user_decrypt: true,
    };

    /// Fails with the first missing capability the controller depends on.
    pub fn ensure_complete(&self) -> Result<(), Error> {
        if !self.encrypt {
            return Err(Error::MissingCapability("encrypt"));
        }
        if !self.keypair {
            return Err(Error::MissingCapability("ephemeral keypair generation"));
        }
        if !self.user_decrypt {
            return Err(Error::MissingCapability("user decryption"));
        }
        Ok(())
    }
}

/// Single-use keypair receiving one oracle reply.
///
/// The secret is wiped when the keypair is dropped.
pub struct EphemeralKeypair {
    public: [u8; 32],
    secret: [u8; 32],
}

impl EphemeralKeypair {
    /// Builds a keypair from a fresh 32-byte secret.
    pub fn from_secret(secret: [u8; 32]) -> Self {
        Self {
            public: derive_public(&secret),
            secret,
        }
    }

    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Whether the public half is the one derived from the secret half.
    pub fn is_consistent(&self) -> bool {
        derive_public(&self.secret) == self.public
    }
}

impl Drop for EphemeralKeypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

fn derive_public(secret: &[u8; 32]) -> [u8; 32] {
    blake3::derive_key(EPHEMERAL_PUBLIC_CONTEXT, secret)
}

/// A value the oracle sealed to an ephemeral secret.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedValue(pub Vec<u8>);

fn reencryption_key(secret: &[u8; 32], handle: &CiphertextHandle) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(secret);
    key[32..].copy_from_slice(handle.as_bytes());
    key
}

/// Seals `value` so that only the holder of `secret` can read it.
pub fn seal_value(
    secret: &[u8; 32],
    handle: &CiphertextHandle,
    value: u32,
) -> Result<SealedValue, Error> {
    let mut key = reencryption_key(secret, handle);
    let sealed = Blake3XorEncryption::new(REENCRYPT_CONTEXT).encrypt(&key, &value.to_le_bytes());
    key.zeroize();
    sealed.map(SealedValue)
}

/// Opens a value the oracle sealed to `keypair`.
pub fn open_value(
    keypair: &EphemeralKeypair,
    handle: &CiphertextHandle,
    sealed: &SealedValue,
) -> Result<u32, Error> {
    let mut key = reencryption_key(keypair.secret(), handle);
    let opened = Blake3XorEncryption::new(REENCRYPT_CONTEXT).decrypt(&key, &sealed.0);
    key.zeroize();
    let bytes: [u8; 4] = opened?.as_slice().try_into().map_err(|_| {
        Error::Oracle(OracleError::Unavailable(format!(
            "oracle returned {} bytes for {handle}, expected 4",
            sealed.0.len()
        )))
    })?;
    Ok(u32::from_le_bytes(bytes))
}

/// A handle and the contract whose state holds it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract: Address,
}

/// Everything the oracle needs for one user decryption.
#[derive(Debug)]
pub struct UserDecryptRequest<'a> {
    pub pairs: &'a [HandleContractPair],
    pub keypair: &'a EphemeralKeypair,
    pub grant: &'a AuthorizationGrant,
    pub account: Address,
}

/// Client and oracle side of the encryption engine.
pub trait EncryptionEngine: Debug + Send + Sync {
    /// Features this engine exposes.
    fn capabilities(&self) -> Capabilities;

    /// Encrypts `value` and proves the ciphertext is bound to
    /// `(contract, submitter)`.
    fn encrypt(
        &self,
        value: u32,
        contract: Address,
        submitter: Address,
    ) -> Result<EncryptedInput, Error>;

    /// Generates a fresh single-use keypair.
    fn new_keypair(&self) -> Result<EphemeralKeypair, Error>;

    /// Checks the grant and returns each requested value sealed to the
    /// request's keypair.
    fn user_decrypt(
        &self,
        request: &UserDecryptRequest<'_>,
    ) -> Result<BTreeMap<CiphertextHandle, SealedValue>, OracleError>;
}

/// Ledger co-processor side of the encryption engine.
pub trait FheExecutor: Debug + Send + Sync {
    /// Verifies the input proof against `(contract, submitter)` and returns the
    /// handle the ledger may operate on.
    fn verify_input(
        &self,
        input: &EncryptedInput,
        contract: Address,
        submitter: Address,
    ) -> Result<CiphertextHandle, LedgerError>;

    /// Returns a new handle encrypting `lhs + rhs` modulo 2^32.
    fn add(
        &self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
    ) -> Result<CiphertextHandle, LedgerError>;

    /// Grants every account in `accounts` the right to have `handle`
    /// decrypted or reused. Either all entries are added or none.
    fn allow(&self, handle: CiphertextHandle, accounts: &[Address]) -> Result<(), LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_value_opens_only_with_matching_keypair() {
        let keypair = EphemeralKeypair::from_secret([5u8; 32]);
        let other = EphemeralKeypair::from_secret([6u8; 32]);
        let handle = CiphertextHandle::from_bytes([1u8; 32]);

        let sealed = seal_value(keypair.secret(), &handle, 75).unwrap();
        assert_eq!(open_value(&keypair, &handle, &sealed).unwrap(), 75);
        assert_ne!(open_value(&other, &handle, &sealed).unwrap(), 75);
    }

    #[test]
    fn truncated_reply_is_rejected() {
        let keypair = EphemeralKeypair::from_secret([5u8; 32]);
        let handle = CiphertextHandle::from_bytes([1u8; 32]);
        let err = open_value(&keypair, &handle, &SealedValue(vec![1, 2])).unwrap_err();
        assert!(matches!(err, Error::Oracle(OracleError::Unavailable(_))));
    }

    #[test]
    fn capability_negotiation_names_missing_feature() {
        let caps = Capabilities {
            user_decrypt: false,
            ..Capabilities::FULL
        };
        assert!(matches!(
            caps.ensure_complete(),
            Err(Error::MissingCapability("user decryption"))
        ));
        assert!(Capabilities::FULL.ensure_complete().is_ok());
    }

    #[test]
    fn keypair_debug_hides_secret() {
        let keypair = EphemeralKeypair::from_secret([0xee; 32]);
        let rendered = format!("{keypair:?}");
        assert!(!rendered.contains(&"ee".repeat(32)));
        assert!(keypair.is_consistent());
    }
}
