//! Orchestration of the user-facing progress actions.
//!
//! [`ProgressController`] turns the ledger, the engine and the authorizer
//! into five actions for one account:
//!
//! - [`add_study_minutes`](ProgressController::add_study_minutes) and
//!   [`complete_task`](ProgressController::complete_task) encrypt a value,
//!   submit it to the ledger, wait for confirmation and refresh the view;
//! - [`decrypt_study_minutes`](ProgressController::decrypt_study_minutes) and
//!   [`decrypt_task_count`](ProgressController::decrypt_task_count) run the
//!   [`DecryptionAuthorizer`] flow and cache the plaintext;
//! - [`refresh`](ProgressController::refresh) re-reads handles and flags.
//!
//! Collaborators are injected. A missing one is reported as
//! [`Error::NotReady`] naming it; an engine is checked for the required
//! capabilities when it is attached, not on every call.
//!
//! # Single flight
//!
//! At most one action runs at a time. A second action started while one is
//! in flight fails immediately with [`Error::Busy`] and leaves the view
//! untouched. The in-flight flag and `is_loading` are cleared on every exit
//! path, including unwinding.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use progress_ledger::{
//!     InMemoryEngine, LocalChain, LocalWallet, ProgressConfig, ProgressController, SystemClock,
//! };
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut rng = StdRng::seed_from_u64(2);
//! let clock = Arc::new(SystemClock);
//! let engine = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
//! let chain = Arc::new(LocalChain::new(clock.clone()));
//! let ledger = chain.deploy(engine.clone())?;
//!
//! let controller = ProgressController::new(ProgressConfig::new(ledger))?
//!     .with_engine(engine)?
//!     .with_signer(Arc::new(LocalWallet::generate(&mut rng)))
//!     .with_transport(chain)
//!     .with_clock(clock);
//!
//! controller.add_study_minutes(30)?;
//! controller.add_study_minutes(45)?;
//! controller.decrypt_study_minutes()?;
//! assert_eq!(controller.snapshot().decrypted_study_minutes, Some(75));
//! # Ok::<(), progress_ledger::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{DecryptionAuthorizer, WalletSigner},
    clock::{Clock, SystemClock},
    config::ProgressConfig,
    engine::EncryptionEngine,
    errors::{Dependency, Error, NetworkError},
    ledger::transport::{LedgerTransport, TxStatus, WriteRequest},
    types::{Address, CiphertextHandle, MetricKind},
};

mod status;

pub use status::{Action, ActionOutcome, ProgressEvent, ProgressSnapshot, Stage};

/// Drives progress actions for the signer's account.
#[derive(Debug)]
pub struct ProgressController {
    config: ProgressConfig,
    engine: Option<Arc<dyn EncryptionEngine>>,
    signer: Option<Arc<dyn WalletSigner>>,
    transport: Option<Arc<dyn LedgerTransport>>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
    view: Mutex<ProgressSnapshot>,
    subscribers: Mutex<Vec<Sender<ProgressEvent>>>,
}

/// Collaborators resolved for one action.
struct Connected {
    ledger: Address,
    account: Address,
    signer: Arc<dyn WalletSigner>,
    transport: Arc<dyn LedgerTransport>,
}

/// Releases the single-flight flag when dropped.
struct InFlight<'a> {
    controller: &'a ProgressController,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.controller.lock_view().is_loading = false;
        self.controller.in_flight.store(false, Ordering::Release);
    }
}

impl ProgressController {
    /// Creates a controller with no collaborators attached.
    pub fn new(config: ProgressConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            engine: None,
            signer: None,
            transport: None,
            clock: Arc::new(SystemClock),
            in_flight: AtomicBool::new(false),
            view: Mutex::new(ProgressSnapshot::default()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Attaches the encryption engine after checking its capabilities.
    pub fn with_engine(mut self, engine: Arc<dyn EncryptionEngine>) -> Result<Self, Error> {
        engine.capabilities().ensure_complete()?;
        self.engine = Some(engine);
        Ok(self)
    }

    pub fn with_signer(mut self, signer: Arc<dyn WalletSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn LedgerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// The connected account, if a signer is attached.
    pub fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Copy of the current view.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock_view().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Opens a channel receiving every subsequent [`ProgressEvent`].
    pub fn subscribe(&self) -> Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock_subscribers().push(tx);
        rx
    }

    /// Adds `delta` minutes to the encrypted study total.
    pub fn add_study_minutes(&self, delta: u32) -> Result<ActionOutcome, Error> {
        self.run(Action::AddStudyMinutes(delta), |this| {
            if delta < 1 {
                return Err(Error::InvalidInput(
                    "study minutes must be at least 1".into(),
                ));
            }
            this.write(Action::AddStudyMinutes(delta), MetricKind::StudyMinutes, delta)
        })
    }

    /// Adds one completed task to the encrypted task count.
    pub fn complete_task(&self) -> Result<ActionOutcome, Error> {
        self.run(Action::CompleteTask, |this| {
            this.write(Action::CompleteTask, MetricKind::TaskCount, 1)
        })
    }

    pub fn decrypt_study_minutes(&self) -> Result<ActionOutcome, Error> {
        self.decrypt(MetricKind::StudyMinutes)
    }

    pub fn decrypt_task_count(&self) -> Result<ActionOutcome, Error> {
        self.decrypt(MetricKind::TaskCount)
    }

    /// Re-reads both handles and the initialization flag.
    pub fn refresh(&self) -> Result<ActionOutcome, Error> {
        self.run(Action::Refresh, |this| {
            let ledger = this.config.require_ledger()?;
            let signer = this.require_signer()?;
            let transport = this.require_transport()?;
            let conn = Connected {
                ledger,
                account: signer.address(),
                signer,
                transport,
            };
            this.stage(Action::Refresh, Stage::Loading);
            this.ensure_deployed(&conn)?;
            this.reload(&conn)?;
            Ok(ActionOutcome::Refreshed(this.snapshot()))
        })
    }

    fn decrypt(&self, metric: MetricKind) -> Result<ActionOutcome, Error> {
        let action = Action::Decrypt(metric);
        self.run(action, |this| {
            let conn = this.connect()?;
            let engine = this.require_engine()?;
            this.ensure_deployed(&conn)?;
            this.stage(action, Stage::Decrypting(metric));
            let authorizer = DecryptionAuthorizer::new(
                &*engine,
                &*conn.signer,
                &*conn.transport,
                &*this.clock,
                &this.config,
            );
            let decrypted = authorizer.decrypt(metric)?;
            this.lock_view().set_decrypted(&decrypted);
            Ok(ActionOutcome::Decrypted(decrypted))
        })
    }

    #[instrument(level = "info", skip_all, fields(metric = ?metric))]
    fn write(&self, action: Action, metric: MetricKind, value: u32) -> Result<ActionOutcome, Error> {
        let conn = self.connect()?;
        let engine = self.require_engine()?;
        self.ensure_deployed(&conn)?;

        self.stage(action, Stage::Encrypting(metric));
        let input = engine.encrypt(value, conn.ledger, conn.account)?;

        self.stage(action, Stage::Submitting);
        let tx_hash = conn.transport.submit_write(WriteRequest {
            contract: conn.ledger,
            from: conn.account,
            metric,
            input,
            gas_limit: self.config.gas_limit,
        })?;

        self.stage(action, Stage::Confirming);
        let timeout = Duration::from_secs(self.config.confirmation_timeout_secs);
        let receipt = conn.transport.wait_for_receipt(&tx_hash, timeout)?;
        if let TxStatus::Reverted(reason) = &receipt.status {
            return Err(NetworkError::Reverted(tx_hash, reason.clone()).into());
        }
        info!(%tx_hash, block = receipt.block_number, "write confirmed");

        self.stage(action, Stage::Refreshing);
        self.reload(&conn)?;
        Ok(ActionOutcome::Written { metric, receipt })
    }

    /// Reads both handles and the account flag into the view.
    fn reload(&self, conn: &Connected) -> Result<(), Error> {
        let mut handles = Vec::with_capacity(MetricKind::ALL.len());
        for metric in MetricKind::ALL {
            let raw = conn.transport.read_handle(conn.ledger, metric, conn.account)?;
            let handle: CiphertextHandle = raw.trim().to_ascii_lowercase().parse()?;
            handles.push((metric, (!handle.is_zero()).then_some(handle)));
        }
        let initialized = conn.transport.is_initialized(conn.ledger, conn.account)?;

        let mut view = self.lock_view();
        for (metric, handle) in handles {
            view.set_encrypted(metric, handle);
        }
        view.is_initialized = initialized;
        Ok(())
    }

    fn ensure_deployed(&self, conn: &Connected) -> Result<(), Error> {
        if !conn.transport.code_exists(conn.ledger)? {
            return Err(Error::NotDeployed(conn.ledger));
        }
        Ok(())
    }

    /// Resolves the ledger, signer and transport, in that order.
    fn connect(&self) -> Result<Connected, Error> {
        let ledger = self.config.require_ledger()?;
        let signer = self.require_signer()?;
        if self.engine.is_none() {
            return Err(Error::NotReady(Dependency::Engine));
        }
        let transport = self.require_transport()?;
        Ok(Connected {
            ledger,
            account: signer.address(),
            signer,
            transport,
        })
    }

    fn require_engine(&self) -> Result<Arc<dyn EncryptionEngine>, Error> {
        self.engine.clone().ok_or(Error::NotReady(Dependency::Engine))
    }

    fn require_signer(&self) -> Result<Arc<dyn WalletSigner>, Error> {
        self.signer.clone().ok_or(Error::NotReady(Dependency::Signer))
    }

    fn require_transport(&self) -> Result<Arc<dyn LedgerTransport>, Error> {
        self.transport
            .clone()
            .ok_or(Error::NotReady(Dependency::Transport))
    }

    /// Runs `body` as one single-flight action and publishes its lifecycle.
    fn run<F>(&self, action: Action, body: F) -> Result<ActionOutcome, Error>
    where
        F: FnOnce(&Self) -> Result<ActionOutcome, Error>,
    {
        let guard = self.begin(action)?;
        let result = body(self);

        let message = match &result {
            Ok(outcome) => outcome.message(),
            Err(err) => {
                warn!(?action, %err, "action failed");
                format!("Error: {err}")
            }
        };
        {
            let mut view = self.lock_view();
            view.status_message = Some(message);
            view.is_loading = false;
        }

        // Held until the terminal event is published.
        self.publish(match &result {
            Ok(outcome) => ProgressEvent::Succeeded {
                action,
                outcome: outcome.clone(),
            },
            Err(error) => ProgressEvent::Failed {
                action,
                error: error.clone(),
            },
        });
        drop(guard);
        result
    }

    fn begin(&self, action: Action) -> Result<InFlight<'_>, Error> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(?action, "rejected while another action is in flight");
            return Err(Error::Busy);
        }
        let guard = InFlight { controller: self };
        self.lock_view().is_loading = true;
        self.publish(ProgressEvent::Started(action));
        Ok(guard)
    }

    fn stage(&self, action: Action, stage: Stage) {
        debug!(?action, ?stage, "stage");
        self.lock_view().status_message = Some(stage.message());
        self.publish(ProgressEvent::Status { action, stage });
    }

    fn publish(&self, event: ProgressEvent) {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() < before {
            warn!(dropped = before - subscribers.len(), "subscriber disconnected");
        }
    }

    // A panic inside an action poisons nothing the view cannot recover from.
    fn lock_view(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Sender<ProgressEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
