use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tracing::{info, instrument, warn};
use tracing_subscriber::fmt;

use progress_ledger::{
    ActionOutcome, InMemoryEngine, LocalChain, LocalWallet, ManualClock, ProgressConfig,
    ProgressController, ProgressEvent,
};

const GENESIS: u64 = 1_700_000_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    fmt()
        .with_max_level(tracing::Level::INFO)
        .with_span_events(fmt::format::FmtSpan::ENTER | fmt::format::FmtSpan::CLOSE)
        .with_target(false)
        .with_ansi(false)
        .init();

    let mut rng = StdRng::seed_from_u64(42);
    let clock = Arc::new(ManualClock::new(GENESIS));
    let engine = Arc::new(InMemoryEngine::new(&mut rng, clock.clone()));
    let chain = Arc::new(LocalChain::new(clock.clone()));
    let ledger = chain.deploy(engine.clone())?;
    info!(%ledger, "local chain ready");

    let alice = ProgressController::new(ProgressConfig::new(ledger))?
        .with_engine(engine.clone())?
        .with_signer(Arc::new(LocalWallet::generate(&mut rng)))
        .with_transport(chain.clone())
        .with_clock(clock.clone());
    let bob = ProgressController::new(ProgressConfig::new(ledger))?
        .with_engine(engine)?
        .with_signer(Arc::new(LocalWallet::generate(&mut rng)))
        .with_transport(chain)
        .with_clock(clock.clone());

    let events = alice.subscribe();

    run_session(&alice, &[30, 45], 2)?;
    clock.advance(60);
    run_session(&bob, &[60], 1)?;

    // Zero minutes never reaches the engine.
    if let Err(err) = alice.add_study_minutes(0) {
        warn!(%err, "rejected as expected");
    }

    let statuses = events
        .try_iter()
        .filter(|e| matches!(e, ProgressEvent::Status { .. }))
        .count();
    info!(statuses, "alice status updates observed");

    for (name, controller) in [("alice", &alice), ("bob", &bob)] {
        let view = controller.snapshot();
        info!(
            account = name,
            study_minutes = ?view.decrypted_study_minutes,
            tasks = ?view.decrypted_task_count,
            "final view"
        );
    }

    Ok(())
}

#[instrument(level = "info", skip_all, fields(account = ?controller.account()))]
fn run_session(
    controller: &ProgressController,
    minutes: &[u32],
    tasks: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    for &delta in minutes {
        controller.add_study_minutes(delta)?;
    }
    for _ in 0..tasks {
        controller.complete_task()?;
    }

    for outcome in [
        controller.decrypt_study_minutes()?,
        controller.decrypt_task_count()?,
    ] {
        if let ActionOutcome::Decrypted(d) = &outcome {
            info!(metric = %d.metric, value = d.value, "{}", outcome.message());
        }
    }
    Ok(())
}
