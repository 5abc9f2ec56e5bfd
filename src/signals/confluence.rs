// =============================================================================
// Confluence Scorer — weighted vote aggregation, stability and clarity
// =============================================================================
//
// Votes are weighted (`confidence * weight[indicator]`) into three buckets:
//   bullish = bullish + oversold votes
//   bearish = bearish + overbought votes
//   neutral = neutral votes
//
// stability = winning bucket / total.  A timeframe only trends when the
// winning bucket is directional AND stability exceeds the threshold;
// everything else is sideways.
//
// This module also scores the market as a whole (stability of the
// environment) and how well MACD and RSI corroborate the trend (clarity).
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::learning::AdaptiveWeights;
use crate::runtime_config::GateConfig;
use crate::signals::votes::{Bucket, VoteSet};
use crate::types::{MarketState, Timeframe, TrendDirection};

/// Partial score used when a stability input is missing or non-finite.
const DATA_GAP_PARTIAL: f64 = 0.5;

/// Direction and dominance of the vote for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    /// `None` for the primary snapshot, otherwise the timeframe scored.
    pub timeframe: Option<Timeframe>,
    pub direction: TrendDirection,
    pub stability_score: f64,
    pub bullish_score: f64,
    pub bearish_score: f64,
    pub neutral_score: f64,
}

impl ConfluenceResult {
    pub fn label(&self) -> String {
        self.timeframe
            .map(|tf| tf.to_string())
            .unwrap_or_else(|| "primary".to_string())
    }
}

/// Aggregate `votes` under `weights`.
pub fn score(votes: &VoteSet, weights: &AdaptiveWeights, stability_threshold: f64) -> ConfluenceResult {
    let mut bullish = 0.0;
    let mut bearish = 0.0;
    let mut neutral = 0.0;

    for vote in votes {
        let weighted = vote.confidence * weights.get(vote.indicator);
        match vote.sentiment.bucket() {
            Bucket::Bullish => bullish += weighted,
            Bucket::Bearish => bearish += weighted,
            Bucket::Neutral => neutral += weighted,
        }
    }

    let total = bullish + bearish + neutral;
    let max_bucket = bullish.max(bearish).max(neutral);
    let stability = if total > 0.0 { max_bucket / total } else { 0.0 };

    let direction = if max_bucket == bullish && stability > stability_threshold {
        TrendDirection::Uptrend
    } else if max_bucket == bearish && stability > stability_threshold {
        TrendDirection::Downtrend
    } else {
        TrendDirection::Sideways
    };

    ConfluenceResult {
        timeframe: None,
        direction,
        stability_score: stability,
        bullish_score: bullish,
        bearish_score: bearish,
        neutral_score: neutral,
    }
}

// =============================================================================
// Market stability
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStability {
    pub stability_score: f64,
    pub is_stable: bool,
    pub volatility_ratio: f64,
    pub volatility_partial: f64,
    pub rsi_partial: f64,
    pub bollinger_partial: f64,
    pub stochastic_partial: f64,
}

/// Score how calm the market is: each input maps to a 0.2–0.9 partial and
/// the partials are averaged.
pub fn assess_market_stability(state: &MarketState, cfg: &GateConfig) -> MarketStability {
    let volatility_ratio = state.volatility_ratio();

    let volatility_partial = if !volatility_ratio.is_finite() || volatility_ratio < 0.0 {
        0.2
    } else if volatility_ratio < 0.02 {
        0.8
    } else if volatility_ratio < 0.05 {
        0.6
    } else {
        0.2
    };

    let rsi = state.rsi;
    let rsi_partial = if !rsi.is_finite() {
        DATA_GAP_PARTIAL
    } else if (35.0..=65.0).contains(&rsi) {
        0.9
    } else if (25.0..=75.0).contains(&rsi) {
        0.6
    } else {
        0.3
    };

    let bollinger_partial = match state.bollinger_position() {
        None => DATA_GAP_PARTIAL,
        Some(pos) if (0.3..=0.7).contains(&pos) => 0.8,
        Some(pos) if (0.2..=0.8).contains(&pos) => 0.6,
        Some(_) => 0.2,
    };

    let k = state.stochastic_k;
    let stochastic_partial = if !k.is_finite() {
        DATA_GAP_PARTIAL
    } else if (30.0..=70.0).contains(&k) {
        0.7
    } else {
        0.3
    };

    let stability_score =
        (volatility_partial + rsi_partial + bollinger_partial + stochastic_partial) / 4.0;

    MarketStability {
        stability_score,
        is_stable: stability_score > cfg.min_stability_score,
        volatility_ratio,
        volatility_partial,
        rsi_partial,
        bollinger_partial,
        stochastic_partial,
    }
}

// =============================================================================
// Trend clarity
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendClarity {
    pub clarity_score: f64,
    pub is_clear: bool,
    pub macd_confirmation: f64,
    pub rsi_confirmation: f64,
}

/// Blend the trend's own stability with MACD and RSI confirmation.
pub fn assess_trend_clarity(
    direction: TrendDirection,
    trend_stability: f64,
    state: &MarketState,
    cfg: &GateConfig,
) -> TrendClarity {
    let macd = state.macd;
    let macd_confirmation = match direction {
        TrendDirection::Uptrend if macd > 0.0 => 0.8,
        TrendDirection::Downtrend if macd < 0.0 => 0.8,
        TrendDirection::Sideways if macd.abs() < 0.001 => 0.6,
        _ => 0.3,
    };

    let rsi = state.rsi;
    let rsi_confirmation = match direction {
        TrendDirection::Uptrend if rsi > 50.0 => 0.7,
        TrendDirection::Downtrend if rsi < 50.0 => 0.7,
        TrendDirection::Sideways if (45.0..=55.0).contains(&rsi) => 0.8,
        _ => 0.4,
    };

    let clarity_score = (trend_stability + macd_confirmation + rsi_confirmation) / 3.0;
    let is_clear = clarity_score > cfg.min_clarity_score && direction != TrendDirection::Sideways;

    debug!(
        direction = %direction,
        trend_stability,
        macd_confirmation,
        rsi_confirmation,
        clarity_score,
        "trend clarity assessed"
    );

    TrendClarity {
        clarity_score,
        is_clear,
        macd_confirmation,
        rsi_confirmation,
    }
}

// =============================================================================
// Tests
// =============================================================================
