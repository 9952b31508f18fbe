//! Wallet signing capability.
//!
//! The authorizer never touches the wallet's long-lived key; it only asks a
//! [`WalletSigner`] for its address and for a signature over typed data.
//! [`LocalWallet`] is an in-process ed25519 wallet.

use core::fmt::{self, Debug};

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    auth::grant::TypedData,
    errors::{DenialReason, Error},
    types::Address,
};

/// Signature produced by a wallet, carrying the signer's verifying key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WalletSignature {
    #[serde(with = "hex::serde")]
    pub signer: [u8; 32],
    #[serde(with = "hex::serde")]
    pub signature: [u8; 64],
}

impl WalletSignature {
    /// Verifies the signature over `digest` and returns the signer's address.
    pub fn verify(&self, digest: &[u8; 32]) -> Result<Address, DenialReason> {
        let key = VerifyingKey::from_bytes(&self.signer).map_err(|_| DenialReason::BadSignature)?;
        let signature = Signature::from_bytes(&self.signature);
        key.verify_strict(digest, &signature)
            .map_err(|_| DenialReason::BadSignature)?;
        Ok(Address::from_public_key(&self.signer))
    }

    /// Hex rendering with a `0x` prefix, as wallets return it.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature))
    }
}

/// An account able to sign typed data.
pub trait WalletSigner: Debug + Send + Sync {
    /// The account this signer acts for.
    fn address(&self) -> Address;

    /// Signs the domain-separated digest of `data`.
    fn sign_typed_data(&self, data: &TypedData) -> Result<WalletSignature, Error>;
}

/// An ed25519 wallet held in memory.
pub struct LocalWallet {
    signing_key: SigningKey,
}

impl LocalWallet {
    pub fn generate<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Self {
        Self {
            signing_key: SigningKey::generate(rng),
        }
    }

    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn verifying_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        Address::from_public_key(&self.verifying_key())
    }

    #[instrument(level = "debug", skip_all, fields(account = %self.address(), primary_type = %data.primary_type))]
    fn sign_typed_data(&self, data: &TypedData) -> Result<WalletSignature, Error> {
        let digest = data.signing_digest();
        let signature = self.signing_key.sign(&digest);
        Ok(WalletSignature {
            signer: self.verifying_key(),
            signature: signature.to_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{auth::grant::DecryptRequest, config::SigningDomain};

    fn typed() -> TypedData {
        DecryptRequest::new([4u8; 32], [Address::from_bytes([8; 20])], 10, 20)
            .typed_data(&SigningDomain::default(), 31337)
    }

    #[test]
    fn signature_recovers_wallet_address() {
        let mut rng = StdRng::seed_from_u64(7);
        let wallet = LocalWallet::generate(&mut rng);
        let data = typed();
        let sig = wallet.sign_typed_data(&data).expect("sign");
        assert_eq!(sig.verify(&data.signing_digest()), Ok(wallet.address()));
        assert_eq!(sig.to_hex().len(), 2 + 128);
    }

    #[test]
    fn tampered_digest_is_rejected() {
        let mut rng = StdRng::seed_from_u64(8);
        let wallet = LocalWallet::generate(&mut rng);
        let data = typed();
        let sig = wallet.sign_typed_data(&data).expect("sign");
        let mut digest = data.signing_digest();
        digest[0] ^= 0xff;
        assert_eq!(sig.verify(&digest), Err(DenialReason::BadSignature));
    }
}
