//! # progress-ledger: private progress metrics on a public ledger
//!
//! progress-ledger keeps per-account counters (study minutes, completed tasks)
//! as ciphertexts on a shared ledger. Anyone can add to their own counters;
//! nobody, including the ledger, sees a plaintext. The owner reads a total
//! back through a signed, time-boxed authorization presented to a decryption
//! oracle.
//!
//! ## Overview
//!
//! Values never leave the client unencrypted. Each write carries a validity
//! proof binding the ciphertext to `(ledger, submitter)`, so an input cannot
//! be replayed into another account or another ledger. The ledger folds new
//! inputs into the stored accumulator with homomorphic addition, modulo
//! 2^32. Decryption uses a single-use ephemeral keypair, authorized by a
//! wallet signature over typed data, so the wallet key is never exposed to the
//! oracle and a leaked decryption key only ever opens one window.
//!
//! ## Architecture
//!
//! - **[`types`]**: Fixed-width identifiers ([`Address`], [`CiphertextHandle`],
//!   [`TxHash`]) and [`MetricKind`].
//!
//! - **[`engine`]**: The encryption engine seams. [`EncryptionEngine`] is the
//!   client and oracle side, [`FheExecutor`] the ledger co-processor side.
//!   [`InMemoryEngine`] implements both.
//!
//! - **[`ledger`]**: [`ProgressLedger`], the encrypted accumulator state
//!   machine, and [`LedgerTransport`] with the in-process [`LocalChain`].
//!
//! - **[`auth`]**: Typed-data grants, wallet signing and the
//!   [`DecryptionAuthorizer`] protocol.
//!
//! - **[`controller`]**: [`ProgressController`], the user-facing actions with
//!   a single-flight guard, a cached [`ProgressSnapshot`] and progress events.
//!
//! - **[`config`]**: [`ProgressConfig`], loadable from JSON.
//!
//! - **[`errors`]**: Error types for ledger reverts, oracle refusals and the
//!   caller-facing [`Error`].
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use progress_ledger::{
//!     InMemoryEngine, LocalChain, LocalWallet, ProgressConfig, ProgressController, SystemClock,
//! };
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let clock = Arc::new(SystemClock);
//! let engine = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
//! let chain = Arc::new(LocalChain::new(clock.clone()));
//!
//! // Deploy a ledger backed by the engine's co-processor
//! let ledger = chain.deploy(engine.clone())?;
//!
//! let controller = ProgressController::new(ProgressConfig::new(ledger))?
//!     .with_engine(engine)?
//!     .with_signer(Arc::new(LocalWallet::generate(&mut rng)))
//!     .with_transport(chain)
//!     .with_clock(clock);
//!
//! controller.complete_task()?;
//! controller.complete_task()?;
//! controller.decrypt_task_count()?;
//! assert_eq!(controller.snapshot().decrypted_task_count, Some(2));
//! # Ok::<(), progress_ledger::Error>(())
//! ```
//!
//! ## Protocol Workflow
//!
//! 1. **Encrypt**: The client calls [`EncryptionEngine::encrypt`] with the
//!    ledger address and its own account, receiving a handle and a proof.
//!
//! 2. **Write**: The transport submits a [`WriteRequest`]; the ledger verifies
//!    the proof, adds the input to the accumulator and grants the caller and
//!    itself access to the new handle.
//!
//! 3. **Authorize**: The client generates an [`EphemeralKeypair`] and has the
//!    wallet sign a [`DecryptRequest`] for it.
//!
//! 4. **Decrypt**: The oracle verifies the [`AuthorizationGrant`] (signature,
//!    signer, key, window, contract and ACL) and returns the value sealed to
//!    the ephemeral key; the client opens it locally.
//!
//! ## Security Considerations
//!
//! - **Grant window**: Grants are valid for `[start, start + duration)`;
//!   expired grants are refused, never extended.
//! - **Ephemeral keys**: Ephemeral secrets are wiped on drop and never leave
//!   the call that created them, except inside the oracle request.
//! - **Overflow**: Accumulators wrap modulo 2^32 without notice.
//! - **Reference engine**: [`InMemoryEngine`] simulates the co-processor with
//!   BLAKE3 keystreams and MACs. It provides the protocol shape, not
//!   homomorphic security.

pub mod auth;
pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod sym_enc;
pub mod types;

mod serde_impl;

#[cfg(test)]
mod testing;

pub use auth::{
    AuthorizationGrant, DecryptRequest, DecryptedMetric, DecryptionAuthorizer, LocalWallet,
    TypedData, TypedDataDomain, WalletSignature, WalletSigner,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ProgressConfig, SigningDomain};
pub use controller::{
    Action, ActionOutcome, ProgressController, ProgressEvent, ProgressSnapshot, Stage,
};
pub use engine::{
    Capabilities, EncryptionEngine, EphemeralKeypair, FheExecutor, HandleContractPair,
    SealedValue, UserDecryptRequest, memory::InMemoryEngine,
};
pub use errors::{
    DenialReason, Dependency, Error, ErrorKind, LedgerError, NetworkError, OracleError,
};
pub use ledger::{
    AccumulatorState, MetricUpdated, ProgressLedger,
    transport::{LedgerTransport, LocalChain, TxReceipt, TxStatus, WRITE_GAS, WriteRequest},
};
pub use sym_enc::{Blake3XorEncryption, SymmetricEncryption};
pub use types::{
    ADDRESS_LEN, Address, CiphertextHandle, EncryptedInput, HANDLE_LEN, MetricKind, TxHash,
    ValidityProof, ZERO_HANDLE,
};
