// =============================================================================
// Signal Engine — shared state of the confluence gate
// =============================================================================
//
// The single owner of everything that outlives one evaluation: signal locks,
// adaptive weights, the per-asset outcome ledger and the decision audit log.
// Tasks share it through `Arc<SignalEngine>`.
//
// Thread safety:
//   - parking_lot::RwLock inside each subsystem; the lock table re-checks
//     expiry under its write guard on emission.
//   - Weights are read as `Arc` snapshots, so an evaluation never observes
//     a half-applied outcome.
//   - Atomic counters for lock-free evaluation statistics.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::decision_envelope::GateDecision;
use crate::learning::{AdaptiveWeights, LedgerSummary, OutcomeLedger, WeightAdjustment, WeightStore};
use crate::lock_manager::LockManager;
use crate::runtime_config::GateConfig;
use crate::signals::{gate, GateOutcome};
use crate::types::{MarketState, OutcomeResult, Timestamp};

/// Maximum number of recent decisions to retain.
const MAX_RECENT_DECISIONS: usize = 100;

pub struct SignalEngine {
    pub locks: LockManager,
    pub weights: WeightStore,
    pub ledger: OutcomeLedger,
    recent_decisions: RwLock<VecDeque<GateDecision>>,
    evaluations: AtomicU64,
    emitted: AtomicU64,
}

/// Point-in-time counters for logging.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub evaluations: u64,
    pub emitted: u64,
    pub active_locks: usize,
    pub weights: AdaptiveWeights,
    pub ledger: LedgerSummary,
}

impl SignalEngine {
    pub fn new(weights: WeightStore) -> Self {
        Self {
            locks: LockManager::new(),
            weights,
            ledger: OutcomeLedger::new(),
            recent_decisions: RwLock::new(VecDeque::with_capacity(MAX_RECENT_DECISIONS)),
            evaluations: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
        }
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    /// Run one snapshot through the gate and record the decision.
    pub fn evaluate(&self, asset_id: &str, mut state: MarketState, cfg: &GateConfig, now: Timestamp) -> GateOutcome {
        if state.asset_id != asset_id {
            debug!(asset = %asset_id, snapshot_asset = %state.asset_id, "snapshot relabelled to requested asset");
            state.asset_id = asset_id.to_string();
        }

        let weights = self.weights.snapshot();
        let learning_factor = self.ledger.learning_factor(asset_id, cfg);
        let outcome = gate::evaluate(&state, &weights, learning_factor, &self.locks, cfg, now);

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if outcome.is_emitted() {
            self.emitted.fetch_add(1, Ordering::Relaxed);
        }
        self.push_decision(GateDecision::from_outcome(asset_id, &outcome));
        outcome
    }

    // ── Feedback ────────────────────────────────────────────────────────

    /// Record a realized outcome for `asset_id` and nudge the weights.
    pub fn apply_outcome(&self, asset_id: &str, result: OutcomeResult, cfg: &GateConfig) -> WeightAdjustment {
        let record = self.ledger.record(asset_id, &result);
        let adjustment = self.weights.apply_outcome(result.outcome, cfg.learning_rate);
        info!(
            asset = %asset_id,
            outcome = %result.outcome,
            pnl = ?result.pnl,
            wins = record.wins,
            outcomes = record.outcomes,
            "outcome applied"
        );
        adjustment
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    pub fn prune_expired(&self, now: Timestamp) -> usize {
        self.locks.prune_expired(now)
    }

    // ── Decision Audit ──────────────────────────────────────────────────

    /// Record a decision. The ring buffer is capped at
    /// [`MAX_RECENT_DECISIONS`]; oldest entries are evicted first.
    fn push_decision(&self, decision: GateDecision) {
        let mut decisions = self.recent_decisions.write();
        decisions.push_back(decision);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.pop_front();
        }
    }

    /// Recent decisions, oldest first.
    pub fn recent_decisions(&self) -> Vec<GateDecision> {
        self.recent_decisions.read().iter().cloned().collect()
    }

    pub fn stats(&self, now: Timestamp) -> EngineStats {
        EngineStats {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            active_locks: self.locks.active_count(now),
            weights: *self.weights.snapshot(),
            ledger: self.ledger.summary(),
        }
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(WeightStore::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_envelope::Verdict;
    use crate::learning::{MAX_WEIGHT, MIN_WEIGHT};
    use crate::types::{AbstainReason, Outcome, SignalType, Timeframe, TimeframeReading};

    const T0: Timestamp = 1_700_000_000.0;

    fn frame(timeframe: Timeframe, rsi: f64, macd: f64, stochastic_k: f64) -> TimeframeReading {
        TimeframeReading {
            timeframe,
            rsi,
            macd,
            bollinger_upper: 102.0,
            bollinger_lower: 98.0,
            stochastic_k,
            ema_fast: 100.2,
            ema_slow: 100.0,
            prev_ema_fast: 99.9,
            prev_ema_slow: 100.0,
        }
    }

    /// Oversold snapshot with every timeframe agreeing on an uptrend.
    fn scenario_a(asset: &str, atr: f64) -> MarketState {
        MarketState {
            asset_id: asset.to_string(),
            price: 100.0,
            rsi: 25.0,
            macd: 0.4,
            bollinger_upper: 102.0,
            bollinger_lower: 98.0,
            stochastic_k: 18.0,
            williams_r: -85.0,
            atr,
            volume_sma: 1.0,
            timestamp: T0,
            timeframes: vec![
                frame(Timeframe::M15, 25.0, 0.4, 18.0),
                frame(Timeframe::M5, 25.0, 0.4, 18.0),
                frame(Timeframe::M1, 25.0, 0.4, 18.0),
            ],
        }
    }

    #[test]
    fn scenario_a_emits_buy_at_price() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        let outcome = engine.evaluate("BTCUSDT", scenario_a("BTCUSDT", 1.0), &cfg, T0);
        let signal = outcome.signal().expect("buy emitted");
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(signal.entry_price, 100.0);
        assert!(signal.confidence >= cfg.confidence_threshold && signal.confidence <= 99.0);
        assert!(engine.locks.is_locked("BTCUSDT", T0 + 1.0));
    }

    #[test]
    fn negative_atr_never_emits_inverted_signal() {
        let engine = SignalEngine::default();
        engine
            .weights
            .restore(AdaptiveWeights::from_values([0.225, 0.4, 0.225, 0.05, 0.05, 0.05]))
            .unwrap();
        let cfg = GateConfig::default();
        let mut state = scenario_a("BTCUSDT", -1.0);
        state.rsi = 60.0;
        state.stochastic_k = 50.0;
        let outcome = engine.evaluate("BTCUSDT", state, &cfg, T0);
        assert!(!outcome.is_emitted(), "emitted {:?}", outcome.signal());
        assert!(!engine.locks.is_locked("BTCUSDT", T0));
    }

    #[test]
    fn scenario_b_high_atr_is_excessive_volatility() {
        let engine = SignalEngine::default();
        let cfg = GateConfig {
            // Let the volatile snapshot reach the volatility check.
            min_stability_score: 0.4,
            ..GateConfig::default()
        };
        let outcome = engine.evaluate("BTCUSDT", scenario_a("BTCUSDT", 9.0), &cfg, T0);
        assert_eq!(outcome.reason(), Some(AbstainReason::ExcessiveVolatility));
    }

    #[test]
    fn scenario_c_lock_window_then_full_evaluation() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        engine.locks.acquire("ETHUSDT", 600.0, T0);

        let inside = engine.evaluate("ETHUSDT", scenario_a("ETHUSDT", 1.0), &cfg, T0 + 300.0);
        assert_eq!(inside.reason(), Some(AbstainReason::Locked));

        let after = engine.evaluate("ETHUSDT", scenario_a("ETHUSDT", 1.0), &cfg, T0 + 601.0);
        assert!(after.is_emitted(), "{after:?}");
    }

    #[test]
    fn scenario_d_losses_push_weights_down() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        for _ in 0..5 {
            let adj = engine.apply_outcome("SOLUSDT", OutcomeResult::loss(), &cfg);
            for (before, nudged) in adj.before.values().iter().zip(adj.nudged.values()) {
                assert!(nudged < *before || nudged == MIN_WEIGHT);
            }
            assert!((adj.after.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(engine.ledger.get("SOLUSDT").map(|r| r.losses), Some(5));
    }

    #[test]
    fn p1_weights_stay_bounded_over_mixed_outcomes() {
        let engine = SignalEngine::default();
        let cfg = GateConfig {
            learning_rate: 0.05,
            ..GateConfig::default()
        };
        for i in 0..300u32 {
            let result = if (i * 7) % 5 < 2 { OutcomeResult::win() } else { OutcomeResult::loss() };
            let after = engine.apply_outcome("BNBUSDT", result, &cfg).after;
            assert!((after.sum() - 1.0).abs() < 1e-9);
            assert!(after
                .values()
                .iter()
                .all(|w| *w >= MIN_WEIGHT - 1e-12 && *w <= MAX_WEIGHT + 1e-12));
        }
    }

    #[test]
    fn p2_locked_for_whole_window() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        let signal = engine
            .evaluate("XRPUSDT", scenario_a("XRPUSDT", 1.0), &cfg, T0)
            .signal()
            .cloned()
            .expect("emitted");
        let mut t = T0 + 1.0;
        while t < signal.locked_until {
            let outcome = engine.evaluate("XRPUSDT", scenario_a("XRPUSDT", 1.0), &cfg, t);
            assert_eq!(outcome.reason(), Some(AbstainReason::Locked), "t={t}");
            t += 37.0;
        }
    }

    #[test]
    fn p4_sideways_timeframe_never_emits() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        for idx in 0..3 {
            let mut state = scenario_a("ADAUSDT", 1.0);
            state.timeframes[idx] = frame(state.timeframes[idx].timeframe, 50.0, 0.0, 50.0);
            let outcome = engine.evaluate("ADAUSDT", state, &cfg, T0);
            assert_eq!(outcome.reason(), Some(AbstainReason::TimeframesNotAligned));
        }
    }

    #[test]
    fn p5_emitted_signals_meet_risk_reward_floor() {
        let cfg = GateConfig::default();
        for atr in [0.2, 0.5, 1.0, 1.5] {
            let engine = SignalEngine::default();
            if let Some(signal) = engine.evaluate("BTCUSDT", scenario_a("BTCUSDT", atr), &cfg, T0).signal() {
                let rr = (signal.take_profit - signal.entry_price).abs()
                    / (signal.entry_price - signal.stop_loss).abs();
                assert!(rr >= cfg.min_risk_reward_ratio);
            }
        }
    }

    #[test]
    fn poor_track_record_lowers_confidence() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        for _ in 0..cfg.min_outcomes_for_learning {
            engine.apply_outcome("BTCUSDT", OutcomeResult::loss(), &cfg);
        }
        // Trend stability ~0.78 scaled by the 0.8 floor falls under 75.
        let outcome = engine.evaluate("BTCUSDT", scenario_a("BTCUSDT", 1.0), &cfg, T0);
        assert_eq!(outcome.reason(), Some(AbstainReason::LowConfidence));
    }

    #[test]
    fn decisions_are_recorded_and_capped() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        engine.evaluate("BTCUSDT", scenario_a("BTCUSDT", 1.0), &cfg, T0);
        for i in 0..150 {
            engine.evaluate("BTCUSDT", scenario_a("BTCUSDT", 1.0), &cfg, T0 + i as f64);
        }
        let decisions = engine.recent_decisions();
        assert_eq!(decisions.len(), MAX_RECENT_DECISIONS);
        assert!(decisions.iter().all(|d| d.verdict == Verdict::Abstain));

        let stats = engine.stats(T0);
        assert_eq!(stats.evaluations, 151);
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.active_locks, 1);
    }

    #[test]
    fn snapshot_asset_follows_requested_asset() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        let outcome = engine.evaluate("ETHUSDT", scenario_a("BTCUSDT", 1.0), &cfg, T0);
        assert_eq!(outcome.signal().map(|s| s.asset_id.as_str()), Some("ETHUSDT"));
        assert!(!engine.locks.is_locked("BTCUSDT", T0));
    }

    #[test]
    fn win_and_loss_move_ledger() {
        let engine = SignalEngine::default();
        let cfg = GateConfig::default();
        engine.apply_outcome("A", OutcomeResult::win().with_pnl(5.0), &cfg);
        let adj = engine.apply_outcome("A", OutcomeResult::loss().with_pnl(-2.0), &cfg);
        assert_eq!(adj.outcome, Outcome::Loss);
        let summary = engine.stats(T0).ledger;
        assert_eq!(summary.outcomes, 2);
        assert!((summary.total_pnl - 3.0).abs() < 1e-12);
    }
}
