// =============================================================================
// Outcome Feedback — single writer for the learning loop
// =============================================================================
//
// Realized outcomes arrive from the external tracker over an mpsc channel.
// One task drains the channel and applies each report in arrival order, so
// weight updates are serialized without the reporters ever touching the
// weight store directly.
//
//   let (tx, rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
//   tokio::spawn(feedback::run(engine, config, rx, shutdown));
//
// On shutdown the loop applies whatever is already queued, then stops.
// =============================================================================

use std::io::BufRead;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::engine::SignalEngine;
use crate::runtime_config::RuntimeConfig;
use crate::types::OutcomeResult;

pub const OUTCOME_CHANNEL_CAPACITY: usize = 1024;

/// A realized outcome for a previously emitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub asset_id: String,
    #[serde(default)]
    pub signal_id: Option<String>,
    #[serde(flatten)]
    pub result: OutcomeResult,
}

fn apply(engine: &SignalEngine, config: &RwLock<RuntimeConfig>, report: OutcomeReport) {
    let cfg = config.read().gate.clone();
    let adjustment = engine.apply_outcome(&report.asset_id, report.result, &cfg);
    info!(
        asset = %report.asset_id,
        signal_id = report.signal_id.as_deref().unwrap_or("-"),
        outcome = %adjustment.outcome,
        rsi = adjustment.after.rsi,
        macd = adjustment.after.macd,
        "weights adjusted from outcome"
    );
}

/// Apply reports until every sender is dropped or `shutdown` flips to true.
/// Returns how many reports were applied.
pub async fn run(
    engine: Arc<SignalEngine>,
    config: Arc<RwLock<RuntimeConfig>>,
    mut reports: mpsc::Receiver<OutcomeReport>,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    info!("outcome feedback loop started");
    let mut applied = 0u64;

    loop {
        if *shutdown.borrow() {
            while let Ok(report) = reports.try_recv() {
                apply(&engine, &config, report);
                applied += 1;
            }
            break;
        }

        tokio::select! {
            report = reports.recv() => match report {
                Some(report) => {
                    apply(&engine, &config, report);
                    applied += 1;
                }
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(applied, "outcome feedback loop stopped");
    applied
}

/// Parse JSON-lines reports from `reader` and forward them to the feedback
/// loop. Blocking; run it on a dedicated thread. Malformed lines are logged
/// and skipped. Returns how many reports were forwarded before EOF or the
/// loop going away.
pub fn forward_reports<R: BufRead>(reader: R, reports: &mpsc::Sender<OutcomeReport>) -> usize {
    let mut forwarded = 0usize;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "outcome input failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<OutcomeReport>(line) {
            Ok(report) => {
                if reports.blocking_send(report).is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => warn!(error = %e, line, "malformed outcome report skipped"),
        }
    }

    forwarded
}
