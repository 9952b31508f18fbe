//! Encrypted per-account progress accumulators.
//!
//! [`ProgressLedger`] is the contract-side state machine. It holds one
//! [`AccumulatorState`] per `(account, metric)` and never sees a plaintext:
//! writes fold a verified input ciphertext into the stored one through the
//! [`FheExecutor`], reads return handles.
//!
//! # Write semantics
//!
//! 1. The input proof must verify against `(ledger address, caller)`.
//! 2. An uninitialized accumulator adopts the input handle; an initialized
//!    one is replaced by `add(stored, input)`. Sums wrap modulo 2^32.
//! 3. The new handle is made decryptable by the ledger and by the caller,
//!    in one executor call.
//! 4. A [`MetricUpdated`] notification is recorded.
//!
//! Only the caller's accumulator is touched. A failed write leaves the
//! ledger's state and every existing ACL unchanged. A ciphertext minted by a
//! failed `add` may stay in the executor's store, unreferenced. The ledger
//! holds no lock: its host (see [`transport::LocalChain`]) executes writes in
//! a total order.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    engine::FheExecutor,
    errors::LedgerError,
    types::{Address, CiphertextHandle, EncryptedInput, MetricKind, ZERO_HANDLE},
};

pub mod transport;

/// Current encrypted value of one metric for one account.
///
/// `initialized == false` exactly when `handle == ZERO_HANDLE`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AccumulatorState {
    pub handle: CiphertextHandle,
    pub initialized: bool,
}

impl Default for AccumulatorState {
    fn default() -> Self {
        Self {
            handle: ZERO_HANDLE,
            initialized: false,
        }
    }
}

/// Notification recorded for every successful write. Carries no ciphertext.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdated {
    pub account: Address,
    pub metric: MetricKind,
    pub timestamp: u64,
}

/// The encrypted progress ledger.
#[derive(Debug)]
pub struct ProgressLedger {
    address: Address,
    executor: Arc<dyn FheExecutor>,
    accumulators: HashMap<(Address, MetricKind), AccumulatorState>,
    events: Vec<MetricUpdated>,
}

impl ProgressLedger {
    pub fn new(address: Address, executor: Arc<dyn FheExecutor>) -> Self {
        Self {
            address,
            executor,
            accumulators: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Folds `input` into the caller's `metric` accumulator.
    #[instrument(level = "debug", skip_all, fields(ledger = %self.address, caller = %caller, metric = ?metric))]
    pub fn write(
        &mut self,
        metric: MetricKind,
        caller: Address,
        input: &EncryptedInput,
        timestamp: u64,
    ) -> Result<(), LedgerError> {
        let verified = self.executor.verify_input(input, self.address, caller)?;
        let current = self.accumulator(caller, metric);
        let next = if current.initialized {
            self.executor.add(current.handle, verified)?
        } else {
            verified
        };
        self.executor.allow(next, &[self.address, caller])?;

        self.accumulators.insert(
            (caller, metric),
            AccumulatorState {
                handle: next,
                initialized: true,
            },
        );
        self.events.push(MetricUpdated {
            account: caller,
            metric,
            timestamp,
        });
        debug!(handle = %next, "accumulator updated");
        Ok(())
    }

    /// Current handle, or [`ZERO_HANDLE`] if never written.
    pub fn read(&self, metric: MetricKind, account: Address) -> CiphertextHandle {
        self.accumulator(account, metric).handle
    }

    pub fn accumulator(&self, account: Address, metric: MetricKind) -> AccumulatorState {
        self.accumulators
            .get(&(account, metric))
            .copied()
            .unwrap_or_default()
    }

    /// True once the account has written any metric.
    pub fn is_initialized(&self, account: Address) -> bool {
        MetricKind::ALL
            .iter()
            .any(|metric| self.is_metric_initialized(account, *metric))
    }

    pub fn is_metric_initialized(&self, account: Address, metric: MetricKind) -> bool {
        self.accumulator(account, metric).initialized
    }

    /// Notifications in write order.
    pub fn events(&self) -> &[MetricUpdated] {
        &self.events
    }
}
