//! Error types for the crate.
//!
//! This module defines the low-level errors raised by the ledger state machine
//! ([`LedgerError`]) and by the decryption oracle ([`OracleError`]) together
//! with the caller-facing [`Error`] used across the controller and authorizer.
//!
//! The errors are implemented with `thiserror`. Every `Error` renders as a
//! specific, human-readable status message; [`Error::kind`] groups variants
//! into the coarse categories callers branch on.
//!
//! # Examples
//!
//! ```rust
//! use progress_ledger::errors::{Dependency, Error, ErrorKind};
//!
//! let err = Error::NotReady(Dependency::Signer);
//! assert_eq!(err.kind(), ErrorKind::Connectivity);
//! ```

use core::fmt;

use thiserror::Error;

use crate::types::{Address, CiphertextHandle, MetricKind, TxHash};

/// Reverts produced by the ledger while executing a write.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum LedgerError {
    /// The validity proof does not bind the ciphertext to this ledger and caller.
    #[error("input proof does not verify for this ledger and caller")]
    InvalidProof,
    /// The co-processor has no ciphertext behind the handle.
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(CiphertextHandle),
    /// The co-processor failed to evaluate the homomorphic addition.
    #[error("homomorphic evaluation failed: {0}")]
    Evaluation(String),
}

/// Why the oracle refused to release a plaintext.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DenialReason {
    /// The typed-data signature does not verify.
    BadSignature,
    /// The signature verifies but belongs to another account.
    SignerMismatch,
    /// The signed public key differs from the submitted one.
    KeypairMismatch,
    /// The grant window has not opened yet.
    NotYetValid,
    /// The grant window is closed.
    Expired,
    /// A handle's contract is not listed in the grant.
    ContractNotInGrant(Address),
    /// The account (or the contract) holds no ACL entry for the handle.
    NotAllowed(CiphertextHandle),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::BadSignature => f.write_str("signature does not verify"),
            DenialReason::SignerMismatch => f.write_str("signature was made by another account"),
            DenialReason::KeypairMismatch => {
                f.write_str("decryption key does not match the signed public key")
            }
            DenialReason::NotYetValid => f.write_str("grant window has not started"),
            DenialReason::Expired => f.write_str("grant window has expired"),
            DenialReason::ContractNotInGrant(addr) => {
                write!(f, "contract {addr} is not covered by the grant")
            }
            DenialReason::NotAllowed(handle) => {
                write!(f, "account is not allowed to decrypt {handle}")
            }
        }
    }
}

/// Errors returned by the oracle's user-decrypt capability.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum OracleError {
    #[error("authorization denied: {0}")]
    Denied(DenialReason),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// A collaborator the controller needs before it can act.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dependency {
    Engine,
    Signer,
    Transport,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Engine => {
                f.write_str("encryption engine not initialized: wait for initialization or check the network connection")
            }
            Dependency::Signer => f.write_str("wallet signer not available: connect a wallet"),
            Dependency::Transport => {
                f.write_str("ledger transport not available: check the RPC connection")
            }
        }
    }
}

/// Transaction submission and confirmation failures.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum NetworkError {
    #[error("transaction submission failed: {0}")]
    Submission(String),
    #[error("gas limit {provided} below required {required}")]
    OutOfGas { required: u64, provided: u64 },
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),
    #[error("transaction {0} not confirmed within {1}s")]
    ConfirmationTimeout(TxHash, u64),
    #[error("transaction {0} reverted: {1}")]
    Reverted(TxHash, LedgerError),
    #[error("read call failed: {0}")]
    Call(String),
}

/// Coarse error categories.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Configuration,
    Connectivity,
    Validation,
    NotDeployed,
    NotInitialized,
    InvalidProof,
    AuthorizationDenied,
    Network,
    Busy,
}

/// High-level errors returned by the controller and the authorizer.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{0}")]
    NotReady(Dependency),
    #[error("required capability missing: {0}")]
    MissingCapability(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid handle format: {0}")]
    InvalidHandleFormat(String),
    #[error("ledger not deployed at {0}: deploy the contract first")]
    NotDeployed(Address),
    #[error("no {metric} recorded yet for {account}")]
    NotInitialized { account: Address, metric: MetricKind },
    #[error("ledger rejected the write: {0}")]
    Ledger(#[from] LedgerError),
    #[error("decryption failed: {0}")]
    Oracle(#[from] OracleError),
    #[error("wallet refused to sign: {0}")]
    Signing(String),
    #[error("{0}")]
    Network(#[from] NetworkError),
    #[error("another operation is already in progress")]
    Busy,
}

impl Error {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::NotReady(_) | Error::MissingCapability(_) => ErrorKind::Connectivity,
            Error::InvalidInput(_) | Error::InvalidHandleFormat(_) => ErrorKind::Validation,
            Error::NotDeployed(_) => ErrorKind::NotDeployed,
            Error::NotInitialized { .. } => ErrorKind::NotInitialized,
            Error::Ledger(LedgerError::InvalidProof)
            | Error::Network(NetworkError::Reverted(_, LedgerError::InvalidProof)) => {
                ErrorKind::InvalidProof
            }
            Error::Ledger(_) => ErrorKind::Network,
            Error::Oracle(OracleError::Denied(_)) | Error::Signing(_) => {
                ErrorKind::AuthorizationDenied
            }
            Error::Oracle(OracleError::Unavailable(_))
            | Error::Network(NetworkError::Call(_)) => ErrorKind::Connectivity,
            Error::Network(_) => ErrorKind::Network,
            Error::Busy => ErrorKind::Busy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverted_invalid_proof_is_classified_as_invalid_proof() {
        let err = Error::Network(NetworkError::Reverted(
            TxHash::from_bytes([7u8; 32]),
            LedgerError::InvalidProof,
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidProof);
        assert!(err.to_string().contains("reverted"));
    }

    #[test]
    fn missing_dependency_message_names_the_dependency() {
        let err = Error::NotReady(Dependency::Engine);
        assert!(err.to_string().starts_with("encryption engine not initialized"));
        let err = Error::NotReady(Dependency::Signer);
        assert!(err.to_string().contains("connect a wallet"));
    }

    #[test]
    fn failed_read_call_is_connectivity() {
        let err = Error::from(NetworkError::Call("no ledger at 0x77".into()));
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        let err = Error::from(NetworkError::Submission("mempool full".into()));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn denial_is_authorization_denied() {
        let err = Error::from(OracleError::Denied(DenialReason::Expired));
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert_eq!(
            err.to_string(),
            "decryption failed: authorization denied: grant window has expired"
        );
    }
}
