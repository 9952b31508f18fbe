//! Configuration for the progress controller and the decryption authorizer.
//!
//! This module provides [`ProgressConfig`], which names the ledger to talk to
//! and its tunables: the grant validity window, the gas limit attached to
//! writes, the confirmation timeout and the typed-data signing domain.
//!
//! # Example
//!
//! ```rust
//! use progress_ledger::{Address, ProgressConfig};
//!
//! let config = ProgressConfig::new(Address::from_bytes([0x42; 20]));
//! assert_eq!(config.grant_duration_seconds(), 10 * 24 * 60 * 60);
//! config.validate().expect("valid config");
//! ```

use serde::{Deserialize, Serialize};

use crate::{errors::Error, types::Address};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Domain fields of the typed-data message signed for user decryption.
///
/// The chain id and verifying contract come from [`ProgressConfig`]; only
/// the name and version are configured here.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SigningDomain {
    pub name: String,
    pub version: String,
}

impl Default for SigningDomain {
    fn default() -> Self {
        Self {
            name: "FHEVM".into(),
            version: "1".into(),
        }
    }
}

/// Complete controller configuration.
///
/// # Fields
///
/// - `ledger_address`: Address of the deployed progress ledger. `None` makes
///   every action fail with a configuration error.
/// - `chain_id`: Chain the ledger lives on; part of the signing domain.
/// - `decrypt_window_days`: Validity window of a user-decryption grant.
/// - `gas_limit`: Gas attached to each write transaction.
/// - `confirmation_timeout_secs`: How long to wait for a write to confirm.
/// - `signing_domain`: Name and version of the typed-data domain.
///
/// # Example
///
/// ```rust
/// use progress_ledger::ProgressConfig;
///
/// let json = r#"{
///     "ledger_address": "0x4242424242424242424242424242424242424242",
///     "chain_id": 11155111,
///     "decrypt_window_days": 1
/// }"#;
/// let config = ProgressConfig::from_json_str(json)?;
/// assert_eq!(config.chain_id, 11155111);
/// assert_eq!(config.gas_limit, 5_000_000);
/// # Ok::<(), progress_ledger::Error>(())
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub ledger_address: Option<Address>,
    pub chain_id: u64,
    pub decrypt_window_days: u32,
    pub gas_limit: u64,
    pub confirmation_timeout_secs: u64,
    pub signing_domain: SigningDomain,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            ledger_address: None,
            chain_id: 31337,
            decrypt_window_days: 10,
            gas_limit: 5_000_000,
            confirmation_timeout_secs: 60,
            signing_domain: SigningDomain::default(),
        }
    }
}

impl ProgressConfig {
    /// Creates a configuration for the given ledger with default tunables.
    pub fn new(ledger_address: Address) -> Self {
        Self {
            ledger_address: Some(ledger_address),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("unreadable configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the ledger address or the configuration error callers report.
    pub fn require_ledger(&self) -> Result<Address, Error> {
        self.ledger_address.ok_or_else(|| {
            Error::Configuration(
                "ledger address not configured: set `ledger_address` to the deployed contract"
                    .into(),
            )
        })
    }

    /// Grant validity window in seconds.
    pub fn grant_duration_seconds(&self) -> u64 {
        u64::from(self.decrypt_window_days) * SECONDS_PER_DAY
    }

    /// Validates the tunables.
    ///
    /// The ledger address is not required here; its absence is reported per
    /// action so a controller can be built before a deployment is known.
    pub fn validate(&self) -> Result<(), Error> {
        if self.decrypt_window_days == 0 {
            return Err(Error::Configuration(
                "decrypt window must be at least one day".into(),
            ));
        }
        if self.gas_limit == 0 {
            return Err(Error::Configuration("gas limit must be non-zero".into()));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(Error::Configuration(
                "confirmation timeout must be non-zero".into(),
            ));
        }
        if self.signing_domain.name.is_empty() {
            return Err(Error::Configuration(
                "signing domain name must not be empty".into(),
            ));
        }
        Ok(())
    }
}
