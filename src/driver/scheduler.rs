// =============================================================================
// Scheduler — the polling loop that drives the gate
// =============================================================================
//
// One loop per process.  On every tick:
//   1. Ask the snapshot source for the next snapshot of every asset.
//   2. Evaluate all assets concurrently (JoinSet) and wait for all of them.
//   3. Publish emitted signals to the sink.
//   4. Sweep expired locks every `prune_interval_secs`.
//   5. Sleep max(poll_interval - tick_time, min_poll_interval).
//
// Shutdown is a watch flag: the loop stops starting ticks, the tick in
// flight runs to completion, then `run` returns its totals.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::driver::sink::SignalSink;
use crate::driver::source::SnapshotSource;
use crate::engine::SignalEngine;
use crate::runtime_config::RuntimeConfig;
use crate::signals::GateOutcome;
use crate::types::{unix_now, Timestamp};

/// Counts for one tick, or summed over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub emitted: usize,
    pub abstained: usize,
    /// Assets the source had nothing for.
    pub idle: usize,
    /// Source errors and failed evaluation tasks.
    pub failed: usize,
}

impl TickReport {
    fn absorb(&mut self, other: TickReport) {
        self.evaluated += other.evaluated;
        self.emitted += other.emitted;
        self.abstained += other.abstained;
        self.idle += other.idle;
        self.failed += other.failed;
    }
}

enum AssetResult {
    Evaluated(GateOutcome),
    Idle,
    Failed,
}

pub struct Scheduler {
    engine: Arc<SignalEngine>,
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn SignalSink>,
    config: Arc<RwLock<RuntimeConfig>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<SignalEngine>,
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn SignalSink>,
        config: Arc<RwLock<RuntimeConfig>>,
    ) -> Self {
        Self {
            engine,
            source,
            sink,
            config,
        }
    }

    /// Evaluate every configured asset once.
    pub async fn tick(&self, now: Timestamp) -> TickReport {
        let (assets, gate_cfg) = {
            let config = self.config.read();
            (config.assets.clone(), Arc::new(config.gate.clone()))
        };

        let mut tasks = JoinSet::new();
        for asset_id in assets {
            let engine = Arc::clone(&self.engine);
            let source = Arc::clone(&self.source);
            let cfg = Arc::clone(&gate_cfg);
            tasks.spawn(async move {
                match source.next_snapshot(&asset_id).await {
                    Ok(Some(state)) => AssetResult::Evaluated(engine.evaluate(&asset_id, state, &cfg, now)),
                    Ok(None) => AssetResult::Idle,
                    Err(e) => {
                        warn!(asset = %asset_id, error = %e, "snapshot source failed, skipping asset this tick");
                        AssetResult::Failed
                    }
                }
            });
        }

        let mut report = TickReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(AssetResult::Evaluated(outcome)) => {
                    report.evaluated += 1;
                    match outcome {
                        GateOutcome::Emitted(signal) => {
                            report.emitted += 1;
                            self.sink.publish(&signal);
                        }
                        GateOutcome::Abstained { .. } => report.abstained += 1,
                    }
                }
                Ok(AssetResult::Idle) => report.idle += 1,
                Ok(AssetResult::Failed) => report.failed += 1,
                Err(e) => {
                    error!(error = %e, "evaluation task failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> TickReport {
        let mut totals = TickReport::default();
        let mut ticks = 0u64;
        let mut last_prune = Instant::now();

        info!(assets = self.config.read().assets.len(), "scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let report = self.tick(unix_now()).await;
            totals.absorb(report);
            ticks += 1;

            let (target, floor, prune_every) = {
                let config = self.config.read();
                (
                    Duration::from_millis(config.poll_interval_ms),
                    Duration::from_millis(config.min_poll_interval_ms),
                    Duration::from_secs(config.prune_interval_secs),
                )
            };

            if last_prune.elapsed() >= prune_every {
                self.engine.prune_expired(unix_now());
                last_prune = Instant::now();
            }

            let elapsed = started.elapsed();
            debug!(
                tick = ticks,
                evaluated = report.evaluated,
                emitted = report.emitted,
                failed = report.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "tick complete"
            );

            let pause = target.saturating_sub(elapsed).max(floor);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            ticks,
            evaluated = totals.evaluated,
            emitted = totals.emitted,
            abstained = totals.abstained,
            failed = totals.failed,
            "scheduler stopped"
        );
        totals
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sink::BroadcastSink;
    use crate::driver::source::ReplaySource;
    use crate::types::{MarketState, Timeframe, TimeframeReading};
    use async_trait::async_trait;

    fn frame(timeframe: Timeframe) -> TimeframeReading {
        TimeframeReading {
            timeframe,
            rsi: 25.0,
            macd: 0.4,
            bollinger_upper: 102.0,
            bollinger_lower: 98.0,
            stochastic_k: 18.0,
            ema_fast: 100.2,
            ema_slow: 100.0,
            prev_ema_fast: 99.9,
            prev_ema_slow: 100.0,
        }
    }

    fn bullish(asset: &str) -> MarketState {
        MarketState {
            asset_id: asset.into(),
            price: 100.0,
            rsi: 25.0,
            macd: 0.4,
            bollinger_upper: 102.0,
            bollinger_lower: 98.0,
            stochastic_k: 18.0,
            williams_r: -85.0,
            atr: 1.0,
            volume_sma: 1.0,
            timestamp: 0.0,
            timeframes: vec![frame(Timeframe::M15), frame(Timeframe::M5), frame(Timeframe::M1)],
        }
    }

    fn config(assets: &[&str]) -> Arc<RwLock<RuntimeConfig>> {
        Arc::new(RwLock::new(RuntimeConfig {
            assets: assets.iter().map(|a| a.to_string()).collect(),
            poll_interval_ms: 20,
            min_poll_interval_ms: 5,
            ..RuntimeConfig::default()
        }))
    }

    struct FailingSource;

    #[async_trait]
    impl SnapshotSource for FailingSource {
        async fn next_snapshot(&self, asset_id: &str) -> anyhow::Result<Option<MarketState>> {
            anyhow::bail!("feed down for {asset_id}")
        }
    }

    #[tokio::test]
    async fn tick_fans_out_and_publishes() {
        let engine = Arc::new(SignalEngine::default());
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        let mut quiet = bullish("ETHUSDT");
        quiet.macd = -0.4;
        let source = Arc::new(ReplaySource::new(vec![bullish("BTCUSDT"), quiet]));
        let scheduler = Scheduler::new(engine.clone(), source, sink, config(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]));

        let report = scheduler.tick(1_700_000_000.0).await;
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.emitted, 1);
        assert_eq!(report.abstained, 1);
        assert_eq!(report.idle, 1);
        assert_eq!(rx.recv().await.unwrap().asset_id, "BTCUSDT");
        assert_eq!(engine.recent_decisions().len(), 2);
    }

    #[tokio::test]
    async fn source_errors_skip_the_asset() {
        let scheduler = Scheduler::new(
            Arc::new(SignalEngine::default()),
            Arc::new(FailingSource),
            Arc::new(BroadcastSink::default()),
            config(&["BTCUSDT", "ETHUSDT"]),
        );
        let report = scheduler.tick(0.0).await;
        assert_eq!(report.failed, 2);
        assert_eq!(report.evaluated, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let engine = Arc::new(SignalEngine::default());
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        let source = Arc::new(ReplaySource::new(vec![bullish("BTCUSDT"), bullish("BTCUSDT")]));
        let scheduler = Scheduler::new(engine.clone(), source, sink, config(&["BTCUSDT"]));

        let (tx, shutdown) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown));

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.asset_id, "BTCUSDT");
        tx.send(true).unwrap();

        let totals = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler stopped in time")
            .unwrap();
        assert_eq!(totals.emitted, 1);
        assert!(totals.evaluated >= 1);
        // The second snapshot, if it was evaluated, hit the lock.
        assert_eq!(totals.evaluated - totals.emitted, totals.abstained);
    }
}
