//! Ledger transport: how clients reach a deployed [`ProgressLedger`].
//!
//! [`LedgerTransport`] splits state-changing calls (submit a write, wait for
//! its receipt) from read-only calls (code check, handle reads, init flags).
//! Handles come back as their boundary rendering, a `0x` hex string; callers
//! parse and validate them.
//!
//! [`LocalChain`] hosts ledgers in-process. Writes execute one at a time
//! behind a mutex, which gives every ledger a total order of transactions.
//! Mining can be paused to model transactions that are submitted but not yet
//! confirmed.

use core::fmt::Debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::{
    clock::Clock,
    engine::FheExecutor,
    errors::{Error, LedgerError, NetworkError},
    ledger::{MetricUpdated, ProgressLedger},
    types::{Address, EncryptedInput, MetricKind, TxHash},
};

/// Gas charged for one accumulator write.
pub const WRITE_GAS: u64 = 250_000;

/// A state-changing call against a ledger.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    pub contract: Address,
    pub from: Address,
    pub metric: MetricKind,
    pub input: EncryptedInput,
    pub gas_limit: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxStatus {
    Success,
    Reverted(LedgerError),
}

/// Outcome of a mined transaction.
#[derive(Clone, Debug)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub timestamp: u64,
    pub status: TxStatus,
    pub events: Vec<MetricUpdated>,
}

/// Read and write channel to deployed ledgers.
pub trait LedgerTransport: Debug + Send + Sync {
    /// Whether a ledger is deployed at `contract`.
    fn code_exists(&self, contract: Address) -> Result<bool, Error>;

    /// Submits a write; returns once the transaction is accepted.
    fn submit_write(&self, request: WriteRequest) -> Result<TxHash, Error>;

    /// Waits for `tx` to be mined, for at most `timeout`.
    fn wait_for_receipt(&self, tx: &TxHash, timeout: Duration) -> Result<TxReceipt, Error>;

    /// Current handle of `account`'s `metric` as a `0x` hex string.
    fn read_handle(
        &self,
        contract: Address,
        metric: MetricKind,
        account: Address,
    ) -> Result<String, Error>;

    /// Whether `account` has written any metric.
    fn is_initialized(&self, contract: Address, account: Address) -> Result<bool, Error>;

    /// Whether `account` has written `metric`.
    fn is_metric_initialized(
        &self,
        contract: Address,
        metric: MetricKind,
        account: Address,
    ) -> Result<bool, Error>;
}

#[derive(Debug, Default)]
struct ChainState {
    ledgers: HashMap<Address, ProgressLedger>,
    receipts: HashMap<TxHash, TxReceipt>,
    pending: VecDeque<(TxHash, WriteRequest)>,
    block_number: u64,
    nonce: u64,
    paused: bool,
}

/// In-process chain hosting any number of ledgers.
#[derive(Debug)]
pub struct LocalChain {
    state: Mutex<ChainState>,
    clock: Arc<dyn Clock>,
}

impl LocalChain {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChainState>, Error> {
        self.state
            .lock()
            .map_err(|_| NetworkError::Submission("chain state lock poisoned".into()).into())
    }

    /// Deploys a fresh ledger backed by `executor` and returns its address.
    pub fn deploy(&self, executor: Arc<dyn FheExecutor>) -> Result<Address, Error> {
        let mut state = self.lock()?;
        state.nonce += 1;
        let mut seed = b"progress-ledger deployment".to_vec();
        seed.extend_from_slice(&state.nonce.to_le_bytes());
        let address = Address::from_public_key(&seed);
        state
            .ledgers
            .insert(address, ProgressLedger::new(address, executor));
        info!(%address, "ledger deployed");
        Ok(address)
    }

    /// Stops mining; submitted writes stay pending until [`Self::mine_pending`].
    pub fn pause_mining(&self) -> Result<(), Error> {
        self.lock()?.paused = true;
        Ok(())
    }

    /// Resumes mining and executes every pending write in submission order.
    pub fn mine_pending(&self) -> Result<usize, Error> {
        let mut state = self.lock()?;
        state.paused = false;
        let mut mined = 0;
        while let Some((tx_hash, request)) = state.pending.pop_front() {
            let now = self.clock.now();
            execute(&mut state, tx_hash, &request, now);
            mined += 1;
        }
        Ok(mined)
    }

    /// Runs `f` against the ledger at `contract`.
    pub fn with_ledger<T>(
        &self,
        contract: Address,
        f: impl FnOnce(&ProgressLedger) -> T,
    ) -> Result<T, Error> {
        let state = self.lock()?;
        state
            .ledgers
            .get(&contract)
            .map(f)
            .ok_or_else(|| NetworkError::Call(format!("no ledger at {contract}")).into())
    }
}

fn execute(state: &mut ChainState, tx_hash: TxHash, request: &WriteRequest, now: u64) {
    state.block_number += 1;
    let block_number = state.block_number;
    let (status, events) = match state.ledgers.get_mut(&request.contract) {
        Some(ledger) => {
            let before = ledger.events().len();
            match ledger.write(request.metric, request.from, &request.input, now) {
                Ok(()) => (TxStatus::Success, ledger.events()[before..].to_vec()),
                Err(err) => {
                    warn!(%tx_hash, %err, "write reverted");
                    (TxStatus::Reverted(err), Vec::new())
                }
            }
        }
        None => (
            TxStatus::Reverted(LedgerError::Evaluation(format!(
                "no ledger at {}",
                request.contract
            ))),
            Vec::new(),
        ),
    };
    state.receipts.insert(
        tx_hash,
        TxReceipt {
            tx_hash,
            block_number,
            timestamp: now,
            status,
            events,
        },
    );
}

fn tx_hash_for(nonce: u64, request: &WriteRequest) -> TxHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"progress-ledger tx");
    hasher.update(&nonce.to_le_bytes());
    hasher.update(request.contract.as_bytes());
    hasher.update(request.from.as_bytes());
    hasher.update(request.input.handle.as_bytes());
    TxHash::from_bytes(*hasher.finalize().as_bytes())
}

impl LedgerTransport for LocalChain {
    fn code_exists(&self, contract: Address) -> Result<bool, Error> {
        Ok(self.lock()?.ledgers.contains_key(&contract))
    }

    #[instrument(level = "debug", skip_all, fields(contract = %request.contract, from = %request.from, metric = ?request.metric))]
    fn submit_write(&self, request: WriteRequest) -> Result<TxHash, Error> {
        if request.gas_limit < WRITE_GAS {
            return Err(NetworkError::OutOfGas {
                required: WRITE_GAS,
                provided: request.gas_limit,
            }
            .into());
        }
        let mut state = self.lock()?;
        if !state.ledgers.contains_key(&request.contract) {
            return Err(NetworkError::Submission(format!(
                "no ledger at {}",
                request.contract
            ))
            .into());
        }
        state.nonce += 1;
        let tx_hash = tx_hash_for(state.nonce, &request);
        if state.paused {
            state.pending.push_back((tx_hash, request));
        } else {
            let now = self.clock.now();
            execute(&mut state, tx_hash, &request, now);
        }
        Ok(tx_hash)
    }

    fn wait_for_receipt(&self, tx: &TxHash, timeout: Duration) -> Result<TxReceipt, Error> {
        let state = self.lock()?;
        if let Some(receipt) = state.receipts.get(tx) {
            return Ok(receipt.clone());
        }
        // Mining is paused; the receipt cannot appear before `mine_pending`.
        if state.pending.iter().any(|(hash, _)| hash == tx) {
            return Err(NetworkError::ConfirmationTimeout(*tx, timeout.as_secs()).into());
        }
        Err(NetworkError::UnknownTransaction(*tx).into())
    }

    fn read_handle(
        &self,
        contract: Address,
        metric: MetricKind,
        account: Address,
    ) -> Result<String, Error> {
        self.with_ledger(contract, |ledger| ledger.read(metric, account).to_string())
    }

    fn is_initialized(&self, contract: Address, account: Address) -> Result<bool, Error> {
        self.with_ledger(contract, |ledger| ledger.is_initialized(account))
    }

    fn is_metric_initialized(
        &self,
        contract: Address,
        metric: MetricKind,
        account: Address,
    ) -> Result<bool, Error> {
        self.with_ledger(contract, |ledger| ledger.is_metric_initialized(account, metric))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        clock::ManualClock,
        engine::{EncryptionEngine, memory::InMemoryEngine},
        types::ZERO_HANDLE,
    };

    const ALICE: Address = Address::from_bytes([0x01; 20]);

    fn setup() -> (Arc<InMemoryEngine>, LocalChain, Address) {
        let mut rng = StdRng::seed_from_u64(31);
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let engine = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
        let chain = LocalChain::new(clock);
        let ledger = chain.deploy(engine.clone()).expect("deploy");
        (engine, chain, ledger)
    }

    fn request(engine: &InMemoryEngine, ledger: Address, value: u32, gas_limit: u64) -> WriteRequest {
        WriteRequest {
            contract: ledger,
            from: ALICE,
            metric: MetricKind::StudyMinutes,
            input: engine.encrypt(value, ledger, ALICE).expect("encrypt"),
            gas_limit,
        }
    }

    #[test]
    fn write_produces_receipt_with_event() {
        let (engine, chain, ledger) = setup();
        let tx = chain
            .submit_write(request(&engine, ledger, 30, 5_000_000))
            .expect("submit");
        let receipt = chain
            .wait_for_receipt(&tx, Duration::from_secs(5))
            .expect("receipt");
        assert_eq!(receipt.status, TxStatus::Success);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.events[0].timestamp, 1_700_000_000);
        assert!(chain.is_initialized(ledger, ALICE).unwrap());
        assert_ne!(
            chain.read_handle(ledger, MetricKind::StudyMinutes, ALICE).unwrap(),
            ZERO_HANDLE.to_string()
        );
    }

    #[test]
    fn uninitialized_read_returns_sentinel_string() {
        let (_, chain, ledger) = setup();
        let raw = chain.read_handle(ledger, MetricKind::TaskCount, ALICE).unwrap();
        assert_eq!(raw, format!("0x{}", "00".repeat(32)));
        assert!(!chain.is_metric_initialized(ledger, MetricKind::TaskCount, ALICE).unwrap());
    }

    #[test]
    fn insufficient_gas_is_rejected_before_execution() {
        let (engine, chain, ledger) = setup();
        let err = chain
            .submit_write(request(&engine, ledger, 30, WRITE_GAS - 1))
            .unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::OutOfGas { .. })));
        assert!(!chain.is_initialized(ledger, ALICE).unwrap());
    }

    #[test]
    fn bad_proof_reverts() {
        let (engine, chain, ledger) = setup();
        let mut req = request(&engine, ledger, 30, 5_000_000);
        req.from = Address::from_bytes([0x02; 20]);
        let tx = chain.submit_write(req).expect("submit");
        let receipt = chain.wait_for_receipt(&tx, Duration::from_secs(5)).unwrap();
        assert_eq!(receipt.status, TxStatus::Reverted(LedgerError::InvalidProof));
        assert!(receipt.events.is_empty());
    }

    #[test]
    fn paused_chain_times_out_then_confirms() {
        let (engine, chain, ledger) = setup();
        chain.pause_mining().unwrap();
        let tx = chain
            .submit_write(request(&engine, ledger, 30, 5_000_000))
            .expect("submit");
        let err = chain
            .wait_for_receipt(&tx, Duration::from_secs(3))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::ConfirmationTimeout(_, 3))
        ));

        assert_eq!(chain.mine_pending().unwrap(), 1);
        let receipt = chain.wait_for_receipt(&tx, Duration::from_secs(3)).unwrap();
        assert_eq!(receipt.status, TxStatus::Success);
    }

    #[test]
    fn undeployed_contract_has_no_code() {
        let (_, chain, _) = setup();
        assert!(!chain.code_exists(Address::from_bytes([0xee; 20])).unwrap());
    }
}
