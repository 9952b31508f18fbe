use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use progress_ledger::{
    DecryptionAuthorizer, EncryptionEngine, InMemoryEngine, LedgerTransport, LocalChain,
    LocalWallet, ManualClock, MetricKind, ProgressConfig, ProgressLedger, WalletSigner,
    WriteRequest,
};

/// Ledger accumulation and the user-decryption round trip (setup done once):
/// - encryption of a bound input is measured
/// - a ledger write (proof check, homomorphic add, ACL update) is measured
/// - a full authorizer decrypt (keypair, signature, oracle, open) is measured
pub fn bench_ledger(c: &mut Criterion) {
    // Deterministic RNG for repeatable benchmarks
    let mut rng = StdRng::seed_from_u64(0xdead_beef);
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let engine = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
    let wallet = LocalWallet::generate(&mut rng);
    let account = wallet.address();

    let chain = LocalChain::new(clock.clone());
    let ledger_address = chain.deploy(engine.clone()).expect("deploy failed");

    c.bench_function("encrypt_input", |b| {
        b.iter(|| {
            let input = engine
                .encrypt(black_box(30), ledger_address, account)
                .expect("encrypt failed");
            black_box(input);
        })
    });

    let mut ledger = ProgressLedger::new(ledger_address, engine.clone());
    let seed = engine
        .encrypt(1, ledger_address, account)
        .expect("encrypt failed");
    ledger
        .write(MetricKind::StudyMinutes, account, &seed, 0)
        .expect("write failed");

    c.bench_function("ledger_write_accumulate", |b| {
        b.iter_batched(
            || {
                engine
                    .encrypt(15, ledger_address, account)
                    .expect("encrypt failed")
            },
            |input| {
                ledger
                    .write(MetricKind::StudyMinutes, account, &input, 1)
                    .expect("write failed");
            },
            criterion::BatchSize::SmallInput,
        )
    });

    // Prepare an initialized accumulator on the chain for decryption
    let tx_input = engine
        .encrypt(75, ledger_address, account)
        .expect("encrypt failed");
    let tx = chain
        .submit_write(WriteRequest {
            contract: ledger_address,
            from: account,
            metric: MetricKind::StudyMinutes,
            input: tx_input,
            gas_limit: 5_000_000,
        })
        .expect("submit failed");
    chain
        .wait_for_receipt(&tx, Duration::from_secs(1))
        .expect("receipt failed");

    let config = ProgressConfig::new(ledger_address);
    let authorizer = DecryptionAuthorizer::new(&*engine, &wallet, &chain, &*clock, &config);

    c.bench_function("user_decrypt_round_trip", |b| {
        b.iter(|| {
            let value = authorizer
                .decrypt(MetricKind::StudyMinutes)
                .expect("decrypt failed");
            black_box(value);
        })
    });
}

criterion_group!(benches, bench_ledger);
criterion_main!(benches);
