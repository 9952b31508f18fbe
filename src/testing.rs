//! Shared fixtures for unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    auth::{DecryptionAuthorizer, LocalWallet, TypedData, WalletSignature, WalletSigner},
    clock::ManualClock,
    config::ProgressConfig,
    engine::{
        Capabilities, EncryptionEngine, EphemeralKeypair, SealedValue, UserDecryptRequest,
        memory::InMemoryEngine,
    },
    errors::{Error, OracleError},
    ledger::transport::{LedgerTransport, LocalChain, TxReceipt, TxStatus, WriteRequest},
    types::{Address, CiphertextHandle, EncryptedInput, MetricKind, TxHash},
};

pub(crate) const GENESIS: u64 = 1_700_000_000;

/// Engine wrapper that counts calls into the engine.
#[derive(Debug)]
pub(crate) struct CountingEngine {
    pub inner: Arc<InMemoryEngine>,
    encrypts: AtomicUsize,
    keypairs: AtomicUsize,
    decrypts: AtomicUsize,
}

impl CountingEngine {
    pub fn new(inner: Arc<InMemoryEngine>) -> Self {
        Self {
            inner,
            encrypts: AtomicUsize::new(0),
            keypairs: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
        }
    }

    pub fn encrypts(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn keypairs(&self) -> usize {
        self.keypairs.load(Ordering::SeqCst)
    }

    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }
}

impl EncryptionEngine for CountingEngine {
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn encrypt(&self, value: u32, contract: Address, submitter: Address) -> Result<EncryptedInput, Error> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt(value, contract, submitter)
    }

    fn new_keypair(&self) -> Result<EphemeralKeypair, Error> {
        self.keypairs.fetch_add(1, Ordering::SeqCst);
        self.inner.new_keypair()
    }

    fn user_decrypt(
        &self,
        request: &UserDecryptRequest<'_>,
    ) -> Result<BTreeMap<CiphertextHandle, SealedValue>, OracleError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.user_decrypt(request)
    }
}

/// Transport wrapper that counts every call.
#[derive(Debug)]
pub(crate) struct CountingTransport {
    pub inner: Arc<LocalChain>,
    calls: AtomicUsize,
}

impl CountingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl LedgerTransport for CountingTransport {
    fn code_exists(&self, contract: Address) -> Result<bool, Error> {
        self.tick();
        self.inner.code_exists(contract)
    }

    fn submit_write(&self, request: WriteRequest) -> Result<TxHash, Error> {
        self.tick();
        self.inner.submit_write(request)
    }

    fn wait_for_receipt(&self, tx: &TxHash, timeout: Duration) -> Result<TxReceipt, Error> {
        self.tick();
        self.inner.wait_for_receipt(tx, timeout)
    }

    fn read_handle(&self, contract: Address, metric: MetricKind, account: Address) -> Result<String, Error> {
        self.tick();
        self.inner.read_handle(contract, metric, account)
    }

    fn is_initialized(&self, contract: Address, account: Address) -> Result<bool, Error> {
        self.tick();
        self.inner.is_initialized(contract, account)
    }

    fn is_metric_initialized(
        &self,
        contract: Address,
        metric: MetricKind,
        account: Address,
    ) -> Result<bool, Error> {
        self.tick();
        self.inner.is_metric_initialized(contract, metric, account)
    }
}

/// Signer that claims one address but signs with another key.
#[derive(Debug)]
pub(crate) struct ImpostorSigner {
    pub claimed: Address,
    pub inner: LocalWallet,
}

impl WalletSigner for ImpostorSigner {
    fn address(&self) -> Address {
        self.claimed
    }

    fn sign_typed_data(&self, data: &TypedData) -> Result<WalletSignature, Error> {
        self.inner.sign_typed_data(data)
    }
}

/// A deployed ledger on a local chain with a manual clock.
pub(crate) struct Fixture {
    rng: RefCell<StdRng>,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<InMemoryEngine>,
    pub engine: Arc<CountingEngine>,
    pub chain: Arc<LocalChain>,
    pub transport: Arc<CountingTransport>,
    pub ledger: Address,
}

impl Fixture {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let clock = Arc::new(ManualClock::new(GENESIS));
        let backend = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
        let chain = Arc::new(LocalChain::new(clock.clone()));
        let ledger = chain.deploy(backend.clone()).expect("deploy");
        Self {
            rng: RefCell::new(rng),
            engine: Arc::new(CountingEngine::new(backend.clone())),
            transport: Arc::new(CountingTransport {
                inner: chain.clone(),
                calls: AtomicUsize::new(0),
            }),
            clock,
            backend,
            chain,
            ledger,
        }
    }

    pub fn wallet(&self) -> LocalWallet {
        LocalWallet::generate(&mut *self.rng.borrow_mut())
    }

    pub fn config(&self) -> ProgressConfig {
        ProgressConfig::new(self.ledger)
    }

    /// Writes `value` for `wallet` directly through the chain.
    pub fn write(&self, wallet: &LocalWallet, metric: MetricKind, value: u32) {
        let from = wallet.address();
        let input = self
            .backend
            .encrypt(value, self.ledger, from)
            .expect("encrypt");
        let tx = self
            .chain
            .submit_write(WriteRequest {
                contract: self.ledger,
                from,
                metric,
                input,
                gas_limit: 5_000_000,
            })
            .expect("submit");
        let receipt = self
            .chain
            .wait_for_receipt(&tx, Duration::from_secs(1))
            .expect("receipt");
        assert_eq!(receipt.status, TxStatus::Success);
    }

    pub fn authorizer<'a>(
        &'a self,
        signer: &'a dyn WalletSigner,
        config: &'a ProgressConfig,
    ) -> DecryptionAuthorizer<'a> {
        DecryptionAuthorizer::new(&*self.engine, signer, &*self.transport, &*self.clock, config)
    }
}
