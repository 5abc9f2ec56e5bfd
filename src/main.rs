// =============================================================================
// Confluence Gate — Main Entry Point
// =============================================================================
//
// Replays indicator snapshots through the gate on a fixed cadence, logs every
// emitted signal, and learns from outcome reports read as JSON lines on
// stdin.  Ctrl+C stops the loop after the current tick and persists the
// adaptive weights and the runtime config.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use confluence_gate::driver::{
    feedback, log_signals, BroadcastSink, ReplaySource, Scheduler, OUTCOME_CHANNEL_CAPACITY,
};
use confluence_gate::learning::WeightStore;
use confluence_gate::types::unix_now;
use confluence_gate::{RuntimeConfig, SignalEngine};

const DEFAULT_CONFIG_PATH: &str = "gate_config.json";
const DEFAULT_REPLAY_PATH: &str = "snapshots.jsonl";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Confluence Gate — Starting Up                    ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("GATE_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override assets from env if available.
    if let Ok(assets) = std::env::var("GATE_ASSETS") {
        config.assets = assets
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(path) = std::env::var("GATE_WEIGHTS_PATH") {
        config.weights_path = path;
    }

    info!(assets = ?config.assets, "Configured assets");
    info!(
        min_stability = config.gate.min_stability_score,
        min_clarity = config.gate.min_clarity_score,
        max_volatility = config.gate.max_volatility_ratio,
        confidence_threshold = config.gate.confidence_threshold,
        min_rr = config.gate.min_risk_reward_ratio,
        "Gate thresholds"
    );

    // ── 2. Adaptive weights ──────────────────────────────────────────────
    let weights = WeightStore::default();
    if std::path::Path::new(&config.weights_path).exists() {
        if let Err(e) = weights.load(&config.weights_path) {
            warn!(error = %e, "Failed to restore adaptive weights, using defaults");
        }
    } else {
        info!(path = %config.weights_path, "No persisted weights, starting from defaults");
    }

    // ── 3. Shared state ──────────────────────────────────────────────────
    let engine = Arc::new(SignalEngine::new(weights));
    let config = Arc::new(RwLock::new(config));

    // ── 4. Snapshot source ───────────────────────────────────────────────
    let replay_path =
        std::env::var("GATE_REPLAY_PATH").unwrap_or_else(|_| DEFAULT_REPLAY_PATH.into());
    let source = Arc::new(
        ReplaySource::load(&replay_path).context("no snapshot source available")?,
    );

    // ── 5. Signal sink + logger ──────────────────────────────────────────
    let sink = Arc::new(BroadcastSink::default());
    let sink_logger = tokio::spawn(log_signals(sink.subscribe()));

    // ── 6. Outcome feedback (stdin → single writer) ──────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
    let feedback_task = tokio::spawn(feedback::run(
        engine.clone(),
        config.clone(),
        outcome_rx,
        shutdown_rx.clone(),
    ));
    // A blocking stdin read cannot be cancelled, so it gets its own thread
    // instead of the runtime's blocking pool.
    std::thread::spawn(move || {
        let forwarded = feedback::forward_reports(std::io::stdin().lock(), &outcome_tx);
        info!(forwarded, "Outcome input closed");
    });

    // ── 7. Scheduler ─────────────────────────────────────────────────────
    let scheduler = Scheduler::new(engine.clone(), source, sink, config.clone());
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 8. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    let _ = shutdown_tx.send(true);
    match scheduler_task.await {
        Ok(totals) => info!(
            evaluated = totals.evaluated,
            emitted = totals.emitted,
            abstained = totals.abstained,
            "Scheduler drained"
        ),
        Err(e) => error!(error = %e, "Scheduler task failed"),
    }

    match feedback_task.await {
        Ok(applied) => info!(applied, "Outcome feedback drained"),
        Err(e) => error!(error = %e, "Feedback task failed"),
    }
    // The scheduler owned the only sender, so the logger drains what the
    // last tick published and then sees Closed.
    match sink_logger.await {
        Ok(logged) => info!(logged, "Signal logger drained"),
        Err(e) => error!(error = %e, "Signal logger task failed"),
    }

    let stats = engine.stats(unix_now());
    info!(
        evaluations = stats.evaluations,
        emitted = stats.emitted,
        active_locks = stats.active_locks,
        outcomes = stats.ledger.outcomes,
        "Final engine stats"
    );

    let config = config.read().clone();
    if let Err(e) = engine.weights.save(&config.weights_path) {
        error!(error = %e, "Failed to save adaptive weights on shutdown");
    }
    if let Err(e) = config.save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Confluence Gate shut down complete.");
    Ok(())
}
