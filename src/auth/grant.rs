//! Authorization grants and the typed-data message they are signed over.
//!
//! A grant lets one ephemeral public key decrypt handles belonging to a list
//! of contracts during `[start_timestamp, start_timestamp + duration_seconds)`.
//! The wallet signs a domain-separated digest of the request; the oracle
//! rebuilds the same digest from the grant and checks the signature.
//!
//! # Digest layout
//!
//! ```text
//! digest        = BLAKE3(0x19 0x01 || domain_separator || struct_hash)
//! domain_sep    = BLAKE3-KDF("... typed-data domain", name, version, chain_id, verifying_contract)
//! struct_hash   = BLAKE3-KDF("... typed-data struct", TYPE_SIGNATURE, fields...)
//! ```
//!
//! Variable-length fields are length-prefixed so no two messages share an
//! encoding.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::{
    auth::signer::WalletSignature,
    config::SigningDomain,
    errors::DenialReason,
    types::Address,
};

/// Primary type name of the user-decryption request.
pub const PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

const TYPE_SIGNATURE: &str = "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,uint256 startTimestamp,uint256 durationSeconds)";

const DOMAIN_CONTEXT: &str = "progress-ledger 2024 typed-data domain";
const STRUCT_CONTEXT: &str = "progress-ledger 2024 typed-data struct";

/// Domain of a typed-data signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl TypedDataDomain {
    fn separator(&self) -> [u8; 32] {
        let mut hasher = Hasher::new_derive_key(DOMAIN_CONTEXT);
        update_prefixed(&mut hasher, self.name.as_bytes());
        update_prefixed(&mut hasher, self.version.as_bytes());
        hasher.update(&self.chain_id.to_be_bytes());
        hasher.update(self.verifying_contract.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// The unsigned body of a grant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecryptRequest {
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_seconds: u64,
}

impl DecryptRequest {
    /// Builds a request; duplicate contracts are dropped, first occurrence wins.
    pub fn new(
        public_key: [u8; 32],
        contracts: impl IntoIterator<Item = Address>,
        start_timestamp: u64,
        duration_seconds: u64,
    ) -> Self {
        let mut contract_addresses = Vec::new();
        for contract in contracts {
            if !contract_addresses.contains(&contract) {
                contract_addresses.push(contract);
            }
        }
        Self {
            public_key,
            contract_addresses,
            start_timestamp,
            duration_seconds,
        }
    }

    /// First second after the window.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp.saturating_add(self.duration_seconds)
    }

    /// Checks that `now` falls inside the half-open validity window.
    pub fn check_window(&self, now: u64) -> Result<(), DenialReason> {
        if now < self.start_timestamp {
            return Err(DenialReason::NotYetValid);
        }
        if now >= self.expires_at() {
            return Err(DenialReason::Expired);
        }
        Ok(())
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contract_addresses.contains(contract)
    }

    /// Wraps the request into the typed-data envelope presented to the wallet.
    ///
    /// The verifying contract is the first listed contract; a request with
    /// no contracts verifies against the zero address and covers nothing.
    pub fn typed_data(&self, domain: &SigningDomain, chain_id: u64) -> TypedData {
        TypedData {
            domain: TypedDataDomain {
                name: domain.name.clone(),
                version: domain.version.clone(),
                chain_id,
                verifying_contract: self.contract_addresses.first().copied().unwrap_or_default(),
            },
            primary_type: PRIMARY_TYPE.to_string(),
            message: self.clone(),
        }
    }

    fn struct_hash(&self) -> [u8; 32] {
        let mut hasher = Hasher::new_derive_key(STRUCT_CONTEXT);
        update_prefixed(&mut hasher, TYPE_SIGNATURE.as_bytes());
        update_prefixed(&mut hasher, &self.public_key);
        hasher.update(&(self.contract_addresses.len() as u64).to_be_bytes());
        for contract in &self.contract_addresses {
            hasher.update(contract.as_bytes());
        }
        hasher.update(&self.start_timestamp.to_be_bytes());
        hasher.update(&self.duration_seconds.to_be_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Structured message handed to the wallet for signing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TypedData {
    pub domain: TypedDataDomain,
    pub primary_type: String,
    pub message: DecryptRequest,
}

impl TypedData {
    /// The 32-byte digest a wallet signs.
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut hasher = Hasher::new();
        hasher.update(&[0x19, 0x01]);
        hasher.update(&self.domain.separator());
        hasher.update(&self.message.struct_hash());
        *hasher.finalize().as_bytes()
    }
}

/// A signed, time-boxed permission for one ephemeral key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    pub request: DecryptRequest,
    pub signature: WalletSignature,
}

impl AuthorizationGrant {
    pub fn new(request: DecryptRequest, signature: WalletSignature) -> Self {
        Self { request, signature }
    }

    /// Verifies the signature against the rebuilt typed data and returns the
    /// signing account.
    pub fn verify_signer(
        &self,
        domain: &SigningDomain,
        chain_id: u64,
    ) -> Result<Address, DenialReason> {
        let digest = self.request.typed_data(domain, chain_id).signing_digest();
        self.signature.verify(&digest)
    }
}

fn update_prefixed(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: u64) -> DecryptRequest {
        DecryptRequest::new(
            [9u8; 32],
            [Address::from_bytes([1; 20]), Address::from_bytes([1; 20])],
            start,
            100,
        )
    }

    #[test]
    fn contracts_form_an_ordered_set() {
        let req = DecryptRequest::new(
            [0u8; 32],
            [
                Address::from_bytes([2; 20]),
                Address::from_bytes([1; 20]),
                Address::from_bytes([2; 20]),
            ],
            0,
            1,
        );
        assert_eq!(
            req.contract_addresses,
            vec![Address::from_bytes([2; 20]), Address::from_bytes([1; 20])]
        );
    }

    #[test]
    fn window_is_half_open() {
        let req = request(1_000);
        assert_eq!(req.check_window(999), Err(DenialReason::NotYetValid));
        assert_eq!(req.check_window(1_000), Ok(()));
        assert_eq!(req.check_window(1_099), Ok(()));
        assert_eq!(req.check_window(1_100), Err(DenialReason::Expired));
    }

    #[test]
    fn digest_binds_every_field() {
        let domain = SigningDomain::default();
        let base = request(1_000).typed_data(&domain, 31337).signing_digest();

        let mut other = request(1_000);
        other.duration_seconds += 1;
        assert_ne!(base, other.typed_data(&domain, 31337).signing_digest());

        let mut other = request(1_000);
        other.public_key[0] ^= 1;
        assert_ne!(base, other.typed_data(&domain, 31337).signing_digest());

        assert_ne!(base, request(1_000).typed_data(&domain, 1).signing_digest());
        assert_eq!(base, request(1_000).typed_data(&domain, 31337).signing_digest());
    }
}
