//! In-process reference engine.
//!
//! [`InMemoryEngine`] stands in for the external FHE co-processor and
//! decryption oracle. It keeps every ciphertext in a store keyed by handle,
//! sealed under a per-handle key derived from the engine's store secret.
//!
//! - **Handles** are keyed BLAKE3 digests of a monotonically increasing
//!   counter, so they are unpredictable and never the zero sentinel.
//! - **Validity proofs** are keyed BLAKE3 MACs over
//!   `(handle, contract, submitter)`; a proof made for one binding fails for
//!   any other.
//! - **Addition** opens both operands inside the engine and stores their
//!   wrapping `u32` sum under a new handle. Callers only ever see handles.
//! - **User decryption** checks the grant signature, signer, keypair, window,
//!   contract scope and ACL, then seals each value to the ephemeral secret.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use rand_core::{CryptoRng, RngCore};
use tracing::{debug, instrument, warn};

use crate::{
    clock::Clock,
    config::SigningDomain,
    engine::{
        Capabilities, EncryptionEngine, EphemeralKeypair, FheExecutor, SealedValue,
        UserDecryptRequest, seal_value,
    },
    errors::{DenialReason, Error, LedgerError, OracleError},
    sym_enc::{Blake3XorEncryption, SymmetricEncryption},
    types::{Address, CiphertextHandle, EncryptedInput, ValidityProof},
};

const STORE_CONTEXT: &str = "progress-ledger 2024 ciphertext store";

#[derive(Debug)]
struct StoredCiphertext {
    sealed: Vec<u8>,
    acl: BTreeSet<Address>,
}

#[derive(Debug, Default)]
struct Store {
    ciphertexts: HashMap<CiphertextHandle, StoredCiphertext>,
    minted: u64,
}

/// Reference implementation of [`EncryptionEngine`] and [`FheExecutor`].
#[derive(Debug)]
pub struct InMemoryEngine {
    store: Mutex<Store>,
    handle_key: [u8; 32],
    proof_key: [u8; 32],
    store_key: [u8; 32],
    keypair_seed: Mutex<[u8; 32]>,
    sealer: Blake3XorEncryption,
    clock: Arc<dyn Clock>,
    domain: SigningDomain,
    chain_id: u64,
    capabilities: Capabilities,
}

impl InMemoryEngine {
    /// Creates an engine with fresh secrets drawn from `rng`.
    pub fn new<R: RngCore + CryptoRng + ?Sized>(rng: &mut R, clock: Arc<dyn Clock>) -> Self {
        let mut secret = || {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            bytes
        };
        Self {
            store: Mutex::new(Store::default()),
            handle_key: secret(),
            proof_key: secret(),
            store_key: secret(),
            keypair_seed: Mutex::new(secret()),
            sealer: Blake3XorEncryption::new(STORE_CONTEXT),
            clock,
            domain: SigningDomain::default(),
            chain_id: 31337,
            capabilities: Capabilities::FULL,
        }
    }

    /// Sets the typed-data domain the oracle verifies grants against.
    pub fn with_domain(mut self, domain: SigningDomain, chain_id: u64) -> Self {
        self.domain = domain;
        self.chain_id = chain_id;
        self
    }

    /// Restricts the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Number of ciphertexts held by the store.
    pub fn ciphertext_count(&self) -> usize {
        self.lock_store().map(|s| s.ciphertexts.len()).unwrap_or(0)
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, Store>, String> {
        self.store
            .lock()
            .map_err(|_| "ciphertext store lock poisoned".to_string())
    }

    fn proof_for(
        &self,
        handle: &CiphertextHandle,
        contract: &Address,
        submitter: &Address,
    ) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.proof_key);
        hasher.update(b"input-proof");
        hasher.update(handle.as_bytes());
        hasher.update(contract.as_bytes());
        hasher.update(submitter.as_bytes());
        hasher.finalize()
    }

    fn slot_key(&self, handle: &CiphertextHandle) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(&self.store_key);
        key[32..].copy_from_slice(handle.as_bytes());
        key
    }

    /// Stores `value` under a freshly minted handle.
    fn mint(&self, store: &mut Store, value: u32) -> Result<CiphertextHandle, String> {
        let handle = loop {
            store.minted += 1;
            let mut hasher = blake3::Hasher::new_keyed(&self.handle_key);
            hasher.update(b"handle");
            hasher.update(&store.minted.to_le_bytes());
            let candidate = CiphertextHandle::from_bytes(*hasher.finalize().as_bytes());
            if !candidate.is_zero() && !store.ciphertexts.contains_key(&candidate) {
                break candidate;
            }
        };
        let sealed = self
            .sealer
            .encrypt(&self.slot_key(&handle), &value.to_le_bytes())
            .map_err(|e| e.to_string())?;
        store.ciphertexts.insert(
            handle,
            StoredCiphertext {
                sealed,
                acl: BTreeSet::new(),
            },
        );
        Ok(handle)
    }

    fn open(&self, store: &Store, handle: &CiphertextHandle) -> Option<u32> {
        let slot = store.ciphertexts.get(handle)?;
        let bytes = self.sealer.decrypt(&self.slot_key(handle), &slot.sealed).ok()?;
        let bytes: [u8; 4] = bytes.as_slice().try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

impl EncryptionEngine for InMemoryEngine {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[instrument(level = "debug", skip_all, fields(contract = %contract, submitter = %submitter))]
    fn encrypt(
        &self,
        value: u32,
        contract: Address,
        submitter: Address,
    ) -> Result<EncryptedInput, Error> {
        if !self.capabilities.encrypt {
            return Err(Error::MissingCapability("encrypt"));
        }
        let mut store = self
            .lock_store()
            .map_err(|e| Error::Oracle(OracleError::Unavailable(e)))?;
        let handle = self
            .mint(&mut store, value)
            .map_err(|e| Error::Oracle(OracleError::Unavailable(e)))?;
        let proof = self.proof_for(&handle, &contract, &submitter);
        debug!(%handle, "encrypted input");
        Ok(EncryptedInput {
            handle,
            proof: ValidityProof(proof.as_bytes().to_vec()),
        })
    }

    fn new_keypair(&self) -> Result<EphemeralKeypair, Error> {
        if !self.capabilities.keypair {
            return Err(Error::MissingCapability("ephemeral keypair generation"));
        }
        let mut seed = self.keypair_seed.lock().map_err(|_| {
            Error::Oracle(OracleError::Unavailable("keypair seed lock poisoned".into()))
        })?;
        // Ratchet the seed so each keypair is independent of every other.
        let secret = blake3::derive_key("progress-ledger 2024 ephemeral secret", &*seed);
        *seed = blake3::derive_key("progress-ledger 2024 ephemeral ratchet", &*seed);
        Ok(EphemeralKeypair::from_secret(secret))
    }

    #[instrument(level = "info", skip_all, fields(account = %request.account, handles = request.pairs.len()))]
    fn user_decrypt(
        &self,
        request: &UserDecryptRequest<'_>,
    ) -> Result<BTreeMap<CiphertextHandle, SealedValue>, OracleError> {
        if !self.capabilities.user_decrypt {
            return Err(OracleError::Unavailable(
                "user decryption not supported".into(),
            ));
        }
        let grant = request.grant;
        let deny = |reason: DenialReason| {
            warn!(%reason, "user decryption denied");
            OracleError::Denied(reason)
        };

        let signer = grant
            .verify_signer(&self.domain, self.chain_id)
            .map_err(deny)?;
        if signer != request.account {
            return Err(deny(DenialReason::SignerMismatch));
        }
        if !request.keypair.is_consistent() || grant.request.public_key != *request.keypair.public()
        {
            return Err(deny(DenialReason::KeypairMismatch));
        }
        grant.request.check_window(self.clock.now()).map_err(deny)?;

        let store = self.lock_store().map_err(OracleError::Unavailable)?;
        let mut out = BTreeMap::new();
        for pair in request.pairs {
            if !grant.request.covers(&pair.contract) {
                return Err(deny(DenialReason::ContractNotInGrant(pair.contract)));
            }
            let slot = store
                .ciphertexts
                .get(&pair.handle)
                .ok_or_else(|| deny(DenialReason::NotAllowed(pair.handle)))?;
            if !slot.acl.contains(&request.account) || !slot.acl.contains(&pair.contract) {
                return Err(deny(DenialReason::NotAllowed(pair.handle)));
            }
            let value = self.open(&store, &pair.handle).ok_or_else(|| {
                OracleError::Unavailable(format!("ciphertext {} unreadable", pair.handle))
            })?;
            let sealed = seal_value(request.keypair.secret(), &pair.handle, value)
                .map_err(|e| OracleError::Unavailable(e.to_string()))?;
            out.insert(pair.handle, sealed);
        }
        Ok(out)
    }
}

impl FheExecutor for InMemoryEngine {
    fn verify_input(
        &self,
        input: &EncryptedInput,
        contract: Address,
        submitter: Address,
    ) -> Result<CiphertextHandle, LedgerError> {
        let proof: [u8; 32] = input
            .proof
            .as_bytes()
            .try_into()
            .map_err(|_| LedgerError::InvalidProof)?;
        // `blake3::Hash` equality is constant time.
        if self.proof_for(&input.handle, &contract, &submitter) != blake3::Hash::from(proof) {
            return Err(LedgerError::InvalidProof);
        }
        let store = self.lock_store().map_err(LedgerError::Evaluation)?;
        if !store.ciphertexts.contains_key(&input.handle) {
            return Err(LedgerError::UnknownHandle(input.handle));
        }
        Ok(input.handle)
    }

    fn add(
        &self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
    ) -> Result<CiphertextHandle, LedgerError> {
        let mut store = self.lock_store().map_err(LedgerError::Evaluation)?;
        let a = self
            .open(&store, &lhs)
            .ok_or(LedgerError::UnknownHandle(lhs))?;
        let b = self
            .open(&store, &rhs)
            .ok_or(LedgerError::UnknownHandle(rhs))?;
        self.mint(&mut store, a.wrapping_add(b))
            .map_err(LedgerError::Evaluation)
    }

    fn allow(&self, handle: CiphertextHandle, accounts: &[Address]) -> Result<(), LedgerError> {
        let mut store = self.lock_store().map_err(LedgerError::Evaluation)?;
        let slot = store
            .ciphertexts
            .get_mut(&handle)
            .ok_or(LedgerError::UnknownHandle(handle))?;
        slot.acl.extend(accounts.iter().copied());
        Ok(())
    }
}
