//! Identifier types shared by every component.
//!
//! All identifiers are fixed-width byte strings rendered on the boundary as
//! lowercase hex with a `0x` prefix:
//!
//! - [`Address`]: 20-byte account or contract address
//! - [`CiphertextHandle`]: 32-byte opaque reference to a ciphertext held by the
//!   encryption engine; [`ZERO_HANDLE`] marks an uninitialized accumulator
//! - [`TxHash`]: 32-byte transaction identifier
//!
//! # Example
//!
//! ```rust
//! use progress_ledger::{CiphertextHandle, ZERO_HANDLE};
//!
//! let handle: CiphertextHandle = format!("0x{}", "AB".repeat(32)).parse().unwrap();
//! assert_eq!(handle.to_string(), format!("0x{}", "ab".repeat(32)));
//! assert!(ZERO_HANDLE.is_zero());
//! ```

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Width in bytes of a ciphertext handle.
pub const HANDLE_LEN: usize = 32;

/// Width in bytes of an account address.
pub const ADDRESS_LEN: usize = 20;

/// Decodes `0x`-prefixed hex of exactly `N` bytes. Case-insensitive.
pub(crate) fn decode_prefixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if digits.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).ok()?;
    Some(out)
}

fn write_prefixed(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "0x{}", hex::encode(bytes))
}

/// An account or contract address.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Derives an address from public key material: the trailing 20 bytes of
    /// its BLAKE3 digest.
    pub fn from_public_key(key: &[u8]) -> Self {
        let digest = blake3::hash(key);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest.as_bytes()[HANDLE_LEN - ADDRESS_LEN..]);
        Self(out)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_prefixed(f, &self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<ADDRESS_LEN>(s)
            .map(Self)
            .ok_or_else(|| Error::InvalidInput(format!("malformed address `{s}`")))
    }
}

/// Opaque reference to a ciphertext held by the encryption engine.
///
/// Handles carry no ownership over the ciphertext; they are copied freely.
/// Equality is byte equality and nothing is assumed about internal structure.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CiphertextHandle([u8; HANDLE_LEN]);

/// Sentinel stored by an accumulator that was never written.
pub const ZERO_HANDLE: CiphertextHandle = CiphertextHandle([0u8; HANDLE_LEN]);

impl CiphertextHandle {
    pub const fn from_bytes(bytes: [u8; HANDLE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HANDLE_LEN]
    }

    /// Parses a handle read from the ledger boundary and rejects the
    /// uninitialized sentinel.
    ///
    /// The input is lowercased first, so mixed-case renderings are accepted.
    pub fn parse_initialized(raw: &str) -> Result<Self, Error> {
        let handle: Self = raw.trim().to_ascii_lowercase().parse()?;
        if handle.is_zero() {
            return Err(Error::InvalidHandleFormat(format!(
                "{raw} is the uninitialized sentinel"
            )));
        }
        Ok(handle)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_prefixed(f, &self.0)
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({self})")
    }
}

impl FromStr for CiphertextHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "0x" {
            return Err(Error::InvalidHandleFormat("empty handle".into()));
        }
        decode_prefixed::<HANDLE_LEN>(s).map(Self).ok_or_else(|| {
            Error::InvalidHandleFormat(format!(
                "`{s}` is not 0x followed by {} hex digits",
                HANDLE_LEN * 2
            ))
        })
    }
}

/// Transaction identifier assigned by the transport.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_prefixed(f, &self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<32>(s)
            .map(Self)
            .ok_or_else(|| Error::InvalidInput(format!("malformed transaction hash `{s}`")))
    }
}

/// The two private metrics tracked per account.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum MetricKind {
    StudyMinutes,
    TaskCount,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::StudyMinutes, MetricKind::TaskCount];

    /// Human-readable label used in status messages.
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::StudyMinutes => "study minutes",
            MetricKind::TaskCount => "task count",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Attestation binding a ciphertext to one `(contract, submitter)` pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidityProof(pub Vec<u8>);

impl ValidityProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A freshly encrypted value together with its validity proof.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedInput {
    pub handle: CiphertextHandle,
    pub proof: ValidityProof,
}
