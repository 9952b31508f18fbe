//! User decryption of encrypted progress metrics.
//!
//! [`DecryptionAuthorizer`] proves to the oracle that the wallet's account
//! may learn the plaintext behind its own accumulators, without the wallet
//! key ever reaching the oracle and without plaintext ever touching the
//! ledger.
//!
//! # Protocol
//!
//! For each call:
//!
//! 1. Every requested metric must be initialized for the account, otherwise
//!    the call fails with [`Error::NotInitialized`] before any cryptographic
//!    work.
//! 2. The current handles are read from the ledger and validated.
//! 3. A fresh [`EphemeralKeypair`] is generated.
//! 4. A [`DecryptRequest`] binds the ephemeral public key, the ledger address,
//!    the current time and the configured window.
//! 5. The wallet signs the request as typed data.
//! 6. The oracle checks the resulting [`AuthorizationGrant`] and returns each
//!    value sealed to the ephemeral key.
//! 7. The values are opened locally; the keypair is dropped (and wiped) when
//!    the call returns.
//!
//! Any oracle refusal surfaces as [`OracleError::Denied`]; nothing is retried.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use progress_ledger::{
//!     DecryptionAuthorizer, EncryptionEngine, InMemoryEngine, LedgerTransport, LocalChain,
//!     LocalWallet, ManualClock, MetricKind, ProgressConfig, WalletSigner, WriteRequest,
//! };
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let clock = Arc::new(ManualClock::new(1_700_000_000));
//! let engine = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
//! let chain = LocalChain::new(clock.clone());
//! let ledger = chain.deploy(engine.clone())?;
//! let wallet = LocalWallet::generate(&mut rng);
//!
//! let input = engine.encrypt(42, ledger, wallet.address())?;
//! let tx = chain.submit_write(WriteRequest {
//!     contract: ledger,
//!     from: wallet.address(),
//!     metric: MetricKind::StudyMinutes,
//!     input,
//!     gas_limit: 5_000_000,
//! })?;
//! chain.wait_for_receipt(&tx, Duration::from_secs(1))?;
//!
//! let config = ProgressConfig::new(ledger);
//! let authorizer = DecryptionAuthorizer::new(&*engine, &wallet, &chain, &*clock, &config);
//! assert_eq!(authorizer.decrypt(MetricKind::StudyMinutes)?.value, 42);
//! # Ok::<(), progress_ledger::Error>(())
//! ```

use tracing::{debug, info, instrument};

use crate::{
    clock::Clock,
    config::ProgressConfig,
    engine::{EncryptionEngine, EphemeralKeypair, HandleContractPair, UserDecryptRequest, open_value},
    errors::{Error, OracleError},
    ledger::transport::LedgerTransport,
    types::{Address, CiphertextHandle, MetricKind},
};

pub mod grant;
pub mod signer;

pub use grant::{AuthorizationGrant, DecryptRequest, TypedData, TypedDataDomain};
pub use signer::{LocalWallet, WalletSignature, WalletSigner};

/// One decrypted accumulator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecryptedMetric {
    pub metric: MetricKind,
    pub handle: CiphertextHandle,
    pub value: u32,
}

/// Runs the user-decryption protocol for the signer's account.
#[derive(Debug)]
pub struct DecryptionAuthorizer<'a> {
    engine: &'a dyn EncryptionEngine,
    signer: &'a dyn WalletSigner,
    transport: &'a dyn LedgerTransport,
    clock: &'a dyn Clock,
    config: &'a ProgressConfig,
}

impl<'a> DecryptionAuthorizer<'a> {
    pub fn new(
        engine: &'a dyn EncryptionEngine,
        signer: &'a dyn WalletSigner,
        transport: &'a dyn LedgerTransport,
        clock: &'a dyn Clock,
        config: &'a ProgressConfig,
    ) -> Self {
        Self {
            engine,
            signer,
            transport,
            clock,
            config,
        }
    }

    /// Decrypts a single metric.
    pub fn decrypt(&self, metric: MetricKind) -> Result<DecryptedMetric, Error> {
        let mut values = self.decrypt_metrics(&[metric])?;
        values
            .pop()
            .ok_or_else(|| Error::Oracle(OracleError::Unavailable("empty oracle reply".into())))
    }

    /// Decrypts several metrics under one grant and one signature.
    ///
    /// Results come back in request order; repeated metrics are decrypted once.
    #[instrument(level = "info", skip_all, fields(account = %self.signer.address(), metrics = metrics.len()))]
    pub fn decrypt_metrics(&self, metrics: &[MetricKind]) -> Result<Vec<DecryptedMetric>, Error> {
        let ledger = self.config.require_ledger()?;
        let account = self.signer.address();
        let resolved = self.resolve(ledger, account, metrics)?;

        let keypair = self.engine.new_keypair()?;
        let grant = self.authorize(&keypair)?;
        self.redeem_resolved(&grant, &keypair, ledger, account, &resolved)
    }

    /// Asks the wallet to sign a grant for `keypair` starting now.
    pub fn authorize(&self, keypair: &EphemeralKeypair) -> Result<AuthorizationGrant, Error> {
        let ledger = self.config.require_ledger()?;
        let request = DecryptRequest::new(
            *keypair.public(),
            [ledger],
            self.clock.now(),
            self.config.grant_duration_seconds(),
        );
        let typed = request.typed_data(&self.config.signing_domain, self.config.chain_id);
        let signature = self.signer.sign_typed_data(&typed)?;
        debug!(expires_at = request.expires_at(), "grant signed");
        Ok(AuthorizationGrant::new(request, signature))
    }

    /// Presents an existing grant to the oracle for `metrics`.
    pub fn redeem(
        &self,
        grant: &AuthorizationGrant,
        keypair: &EphemeralKeypair,
        metrics: &[MetricKind],
    ) -> Result<Vec<DecryptedMetric>, Error> {
        let ledger = self.config.require_ledger()?;
        let account = self.signer.address();
        let resolved = self.resolve(ledger, account, metrics)?;
        self.redeem_resolved(grant, keypair, ledger, account, &resolved)
    }

    /// Checks initialization and reads the current handle of every metric.
    fn resolve(
        &self,
        ledger: Address,
        account: Address,
        metrics: &[MetricKind],
    ) -> Result<Vec<(MetricKind, CiphertextHandle)>, Error> {
        let mut resolved: Vec<(MetricKind, CiphertextHandle)> = Vec::with_capacity(metrics.len());
        for &metric in metrics {
            if resolved.iter().any(|(m, _)| *m == metric) {
                continue;
            }
            if !self.transport.is_metric_initialized(ledger, metric, account)? {
                return Err(Error::NotInitialized { account, metric });
            }
            let raw = self.transport.read_handle(ledger, metric, account)?;
            resolved.push((metric, CiphertextHandle::parse_initialized(&raw)?));
        }
        Ok(resolved)
    }

    fn redeem_resolved(
        &self,
        grant: &AuthorizationGrant,
        keypair: &EphemeralKeypair,
        ledger: Address,
        account: Address,
        resolved: &[(MetricKind, CiphertextHandle)],
    ) -> Result<Vec<DecryptedMetric>, Error> {
        let pairs: Vec<HandleContractPair> = resolved
            .iter()
            .map(|&(_, handle)| HandleContractPair {
                handle,
                contract: ledger,
            })
            .collect();
        let sealed = self.engine.user_decrypt(&UserDecryptRequest {
            pairs: &pairs,
            keypair,
            grant,
            account,
        })?;

        let mut out = Vec::with_capacity(resolved.len());
        for &(metric, handle) in resolved {
            let payload = sealed.get(&handle).ok_or_else(|| {
                Error::Oracle(OracleError::Unavailable(format!("no value returned for {handle}")))
            })?;
            let value = open_value(keypair, &handle, payload)?;
            out.push(DecryptedMetric {
                metric,
                handle,
                value,
            });
        }
        info!(count = out.len(), "metrics decrypted");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{DenialReason, ErrorKind},
        testing::{Fixture, ImpostorSigner},
    };

    #[test]
    fn decrypts_accumulated_total() {
        let fx = Fixture::new(3);
        let alice = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 30);
        fx.write(&alice, MetricKind::StudyMinutes, 45);

        let config = fx.config();
        let authorizer = fx.authorizer(&alice, &config);
        let decrypted = authorizer.decrypt(MetricKind::StudyMinutes).expect("decrypt");
        assert_eq!(decrypted.value, 75);
        assert_eq!(decrypted.metric, MetricKind::StudyMinutes);
    }

    #[test]
    fn one_grant_covers_several_metrics() {
        let fx = Fixture::new(4);
        let alice = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 20);
        fx.write(&alice, MetricKind::TaskCount, 1);
        fx.write(&alice, MetricKind::TaskCount, 1);

        let config = fx.config();
        let authorizer = fx.authorizer(&alice, &config);
        let values = authorizer
            .decrypt_metrics(&[MetricKind::TaskCount, MetricKind::StudyMinutes, MetricKind::TaskCount])
            .expect("decrypt");
        let got: Vec<_> = values.iter().map(|d| (d.metric, d.value)).collect();
        assert_eq!(
            got,
            vec![(MetricKind::TaskCount, 2), (MetricKind::StudyMinutes, 20)]
        );
        assert_eq!(fx.engine.keypairs(), 1);
        assert_eq!(fx.engine.decrypts(), 1);
    }

    #[test]
    fn uninitialized_metric_fails_before_any_oracle_work() {
        let fx = Fixture::new(5);
        let alice = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 10);

        let config = fx.config();
        let authorizer = fx.authorizer(&alice, &config);
        let err = authorizer.decrypt(MetricKind::TaskCount).unwrap_err();
        assert!(matches!(
            err,
            Error::NotInitialized {
                metric: MetricKind::TaskCount,
                ..
            }
        ));
        assert_eq!(fx.engine.keypairs(), 0);
        assert_eq!(fx.engine.decrypts(), 0);
    }

    #[test]
    fn grant_presented_after_window_is_denied() {
        let fx = Fixture::new(6);
        let alice = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 30);

        let config = fx.config();
        let authorizer = fx.authorizer(&alice, &config);
        let keypair = fx.engine.new_keypair().expect("keypair");
        let grant = authorizer.authorize(&keypair).expect("grant");

        fx.clock.advance(config.grant_duration_seconds() - 1);
        let values = authorizer
            .redeem(&grant, &keypair, &[MetricKind::StudyMinutes])
            .expect("still inside window");
        assert_eq!(values[0].value, 30);

        fx.clock.advance(1);
        let err = authorizer
            .redeem(&grant, &keypair, &[MetricKind::StudyMinutes])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert!(matches!(
            err,
            Error::Oracle(OracleError::Denied(DenialReason::Expired))
        ));
    }

    #[test]
    fn signature_from_another_key_is_denied() {
        let fx = Fixture::new(7);
        let alice = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 30);

        let impostor = ImpostorSigner {
            claimed: alice.address(),
            inner: fx.wallet(),
        };
        let config = fx.config();
        let authorizer =
            DecryptionAuthorizer::new(&*fx.engine, &impostor, &*fx.transport, &*fx.clock, &config);
        let err = authorizer.decrypt(MetricKind::StudyMinutes).unwrap_err();
        assert!(matches!(
            err,
            Error::Oracle(OracleError::Denied(DenialReason::SignerMismatch))
        ));
    }

    #[test]
    fn grant_bound_to_another_keypair_is_denied() {
        let fx = Fixture::new(8);
        let alice = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 30);

        let config = fx.config();
        let authorizer = fx.authorizer(&alice, &config);
        let signed_for = fx.engine.new_keypair().expect("keypair");
        let presented = fx.engine.new_keypair().expect("keypair");
        let grant = authorizer.authorize(&signed_for).expect("grant");
        let err = authorizer
            .redeem(&grant, &presented, &[MetricKind::StudyMinutes])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Oracle(OracleError::Denied(DenialReason::KeypairMismatch))
        ));
    }

    #[test]
    fn other_accounts_cannot_read_each_others_totals() {
        let fx = Fixture::new(9);
        let alice = fx.wallet();
        let bob = fx.wallet();
        fx.write(&alice, MetricKind::StudyMinutes, 30);
        fx.write(&bob, MetricKind::StudyMinutes, 60);

        let config = fx.config();
        assert_eq!(
            fx.authorizer(&alice, &config)
                .decrypt(MetricKind::StudyMinutes)
                .unwrap()
                .value,
            30
        );
        assert_eq!(
            fx.authorizer(&bob, &config)
                .decrypt(MetricKind::StudyMinutes)
                .unwrap()
                .value,
            60
        );
    }

    #[test]
    fn missing_ledger_address_is_configuration_error() {
        let fx = Fixture::new(10);
        let alice = fx.wallet();
        let config = ProgressConfig::default();
        let err = fx
            .authorizer(&alice, &config)
            .decrypt(MetricKind::StudyMinutes)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
