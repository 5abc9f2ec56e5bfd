// =============================================================================
// Signal Gate — 7 ordered admission checks before any signal is emitted
// =============================================================================
//
// Every check must pass for a signal to be emitted.  The first failing check
// short-circuits the evaluation and its reason is returned; abstaining is a
// normal outcome, never an error.
//
// Checks:
//   1. Locked                : asset is still inside its cool-down window
//   2. UnstableMarket        : market stability <= min_stability_score
//   3. UnclearTrend          : sideways, or clarity <= min_clarity_score
//   4. ExcessiveVolatility   : atr / price > max_volatility_ratio, or a
//                              non-positive or non-finite price or atr
//   5. TimeframesNotAligned  : a timeframe is missing, disagrees, or the
//                              fastest one shows no entry trigger
//   6. LowConfidence         : adjusted confidence < confidence_threshold
//   7. PoorRiskReward        : reward / risk < min_risk_reward_ratio
//
// On success the lock is re-checked and installed atomically; losing that
// race to a concurrent emitter yields Locked.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::learning::AdaptiveWeights;
use crate::lock_manager::{lock_duration, LockManager};
use crate::runtime_config::GateConfig;
use crate::signals::assessment::{assess, OverallAssessment};
use crate::types::{AbstainReason, MarketState, SignalType, Timestamp};

/// Upper bound of the confidence scale.
const MAX_CONFIDENCE: f64 = 99.0;

/// An admitted trading signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub asset_id: String,
    pub signal_type: SignalType,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Adjusted confidence, 0–99.
    pub confidence: f64,
    pub risk_reward_ratio: f64,
    /// `atr / price` at emission.
    pub volatility_score: f64,
    pub reasoning: String,
    pub locked_until: Timestamp,
    pub created_at: String,
    pub trend_stability: f64,
    pub market_stability: f64,
    pub trend_clarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateOutcome {
    Emitted(Signal),
    Abstained { reason: AbstainReason },
}

impl GateOutcome {
    fn abstain(reason: AbstainReason) -> Self {
        Self::Abstained { reason }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Self::Emitted(signal) => Some(signal),
            Self::Abstained { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<AbstainReason> {
        match self {
            Self::Emitted(_) => None,
            Self::Abstained { reason } => Some(*reason),
        }
    }

    pub fn is_emitted(&self) -> bool {
        matches!(self, Self::Emitted(_))
    }
}

/// Stop, target and ratio proposed for an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskPlan {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
}

/// ATR-based stop and target. A zero or non-finite risk gives ratio 0, as
/// does a non-positive `atr`, which would put the stop on the wrong side.
pub fn risk_plan(signal_type: SignalType, entry: f64, atr: f64, cfg: &GateConfig) -> RiskPlan {
    let stop_distance = cfg.stop_loss_atr_multiple * atr;
    let target_distance = cfg.take_profit_atr_multiple * atr;
    let (stop_loss, take_profit) = match signal_type {
        SignalType::Buy => (entry - stop_distance, entry + target_distance),
        SignalType::Sell => (entry + stop_distance, entry - target_distance),
    };

    let risk = (entry - stop_loss).abs();
    let reward = (take_profit - entry).abs();
    let risk_reward_ratio = if atr > 0.0 && risk.is_finite() && reward.is_finite() && risk > 0.0 {
        reward / risk
    } else {
        0.0
    };

    RiskPlan {
        stop_loss,
        take_profit,
        risk_reward_ratio,
    }
}

/// Trend stability scaled to 0–100, boosted by the asset's learning factor
/// and nudged by market stability and clarity, capped at 99.
pub fn adjusted_confidence(assessment: &OverallAssessment, learning_factor: f64) -> f64 {
    let base = assessment.trend_stability * 100.0;
    let adjusted = base * learning_factor
        + assessment.stability_score * 0.1
        + assessment.clarity_score * 0.1;
    adjusted.min(MAX_CONFIDENCE)
}

/// Assess `state` and run it through the gate.
pub fn evaluate(
    state: &MarketState,
    weights: &AdaptiveWeights,
    learning_factor: f64,
    locks: &LockManager,
    cfg: &GateConfig,
    now: Timestamp,
) -> GateOutcome {
    // Nothing to assess while the asset is cooling down.
    if locks.is_locked(&state.asset_id, now) {
        debug!(asset = %state.asset_id, "abstain: locked");
        return GateOutcome::abstain(AbstainReason::Locked);
    }
    let assessment = assess(state, weights, cfg);
    admit(state, &assessment, learning_factor, locks, cfg, now)
}

/// Apply the ordered checks to an already computed assessment.
pub fn admit(
    state: &MarketState,
    assessment: &OverallAssessment,
    learning_factor: f64,
    locks: &LockManager,
    cfg: &GateConfig,
    now: Timestamp,
) -> GateOutcome {
    let asset_id = state.asset_id.as_str();
    let abstain = |reason: AbstainReason| {
        debug!(
            asset = %asset_id,
            reason = %reason,
            stability = assessment.stability_score,
            clarity = assessment.clarity_score,
            volatility = assessment.volatility_ratio,
            "abstain"
        );
        GateOutcome::abstain(reason)
    };

    // ── 1. Lock ──────────────────────────────────────────────────────────
    if locks.is_locked(asset_id, now) {
        return abstain(AbstainReason::Locked);
    }

    // ── 2. Market stability ──────────────────────────────────────────────
    if !(assessment.is_stable && assessment.stability_score > cfg.min_stability_score) {
        return abstain(AbstainReason::UnstableMarket);
    }

    // ── 3. Trend clarity ─────────────────────────────────────────────────
    let signal_type = match SignalType::from_direction(assessment.direction) {
        Some(side) if assessment.is_clear && assessment.clarity_score > cfg.min_clarity_score => side,
        _ => return abstain(AbstainReason::UnclearTrend),
    };

    // ── 4. Volatility ────────────────────────────────────────────────────
    if !(state.price.is_finite() && state.price > 0.0 && state.atr.is_finite() && state.atr > 0.0) {
        warn!(
            asset = %asset_id,
            price = state.price,
            atr = state.atr,
            "price or atr is not a positive number, treating snapshot as a data gap"
        );
        return abstain(AbstainReason::ExcessiveVolatility);
    }
    // NaN compares false, so a non-finite ratio fails here.
    if !(assessment.volatility_ratio <= cfg.max_volatility_ratio) {
        return abstain(AbstainReason::ExcessiveVolatility);
    }

    // ── 5. Timeframe agreement ───────────────────────────────────────────
    if !assessment.timeframes_aligned {
        return abstain(AbstainReason::TimeframesNotAligned);
    }

    // ── 6. Confidence ────────────────────────────────────────────────────
    let confidence = adjusted_confidence(assessment, learning_factor);
    if !(confidence >= cfg.confidence_threshold) {
        return abstain(AbstainReason::LowConfidence);
    }

    // ── 7. Risk / reward ─────────────────────────────────────────────────
    let plan = risk_plan(signal_type, state.price, state.atr, cfg);
    if !(plan.risk_reward_ratio >= cfg.min_risk_reward_ratio) {
        return abstain(AbstainReason::PoorRiskReward);
    }

    // ── Emit ─────────────────────────────────────────────────────────────
    let locked_until = now + lock_duration(assessment.volatility_ratio, assessment.stability_score, cfg);
    if !locks.try_acquire(asset_id, locked_until, now) {
        return abstain(AbstainReason::Locked);
    }

    let signal = Signal {
        id: uuid::Uuid::new_v4().to_string(),
        asset_id: asset_id.to_string(),
        signal_type,
        entry_price: state.price,
        stop_loss: plan.stop_loss,
        take_profit: plan.take_profit,
        confidence,
        risk_reward_ratio: plan.risk_reward_ratio,
        volatility_score: assessment.volatility_ratio,
        reasoning: reasoning(state, signal_type, assessment),
        locked_until,
        created_at: chrono::Utc::now().to_rfc3339(),
        trend_stability: assessment.trend_stability,
        market_stability: assessment.stability_score,
        trend_clarity: assessment.clarity_score,
    };

    info!(
        asset = %signal.asset_id,
        side = %signal.signal_type,
        entry = signal.entry_price,
        stop = signal.stop_loss,
        target = signal.take_profit,
        confidence = signal.confidence,
        rr = signal.risk_reward_ratio,
        locked_until = signal.locked_until,
        "SIGNAL EMITTED"
    );

    GateOutcome::Emitted(signal)
}

fn reasoning(state: &MarketState, signal_type: SignalType, assessment: &OverallAssessment) -> String {
    let mut parts = vec![format!(
        "{} confirmed on {} timeframes: stability {:.2}, clarity {:.2}, trend {:.2}",
        signal_type,
        assessment.direction,
        assessment.stability_score,
        assessment.clarity_score,
        assessment.trend_stability
    )];

    if state.rsi < 30.0 {
        parts.push("RSI oversold".to_string());
    } else if state.rsi > 70.0 {
        parts.push("RSI overbought".to_string());
    }
    if state.macd.abs() > 0.01 {
        parts.push(format!(
            "MACD {}",
            if state.macd > 0.0 { "positive" } else { "negative" }
        ));
    }
    if let Some(trigger) = &assessment.entry_trigger {
        parts.push(format!(
            "{} EMA {} ({:+.2}%)",
            trigger.timeframe,
            if trigger.fresh_cross { "cross" } else { "expansion" },
            trigger.momentum_pct
        ));
    }
    if assessment.stability_score > 0.8 {
        parts.push("high stability".to_string());
    }
    if assessment.clarity_score > 0.8 {
        parts.push("very clear trend".to_string());
    }

    parts.join(" | ")
}

// =============================================================================
// Tests
// =============================================================================
