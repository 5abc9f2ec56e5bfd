// =============================================================================
// Overall Assessment — everything the gate needs to know about one snapshot
// =============================================================================
//
//   primary votes ──► score ──► direction + trend stability
//   snapshot      ──► market stability, volatility ratio
//   direction     ──► trend clarity (MACD / RSI corroboration)
//   timeframes    ──► all-agree alignment + entry trigger
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::learning::AdaptiveWeights;
use crate::runtime_config::GateConfig;
use crate::signals::confluence::{assess_market_stability, assess_trend_clarity, score, ConfluenceResult};
use crate::signals::timeframes::{self, EntryTrigger};
use crate::signals::votes::{vote, Oscillators};
use crate::types::{MarketState, TrendDirection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub is_stable: bool,
    pub stability_score: f64,
    pub is_clear: bool,
    pub clarity_score: f64,
    pub volatility_ratio: f64,
    pub timeframes_aligned: bool,
    /// Direction of the primary snapshot.
    pub direction: TrendDirection,
    /// Winning-bucket share of the primary snapshot.
    pub trend_stability: f64,
    pub timeframes: Vec<ConfluenceResult>,
    pub entry_trigger: Option<EntryTrigger>,
    pub alignment_reason: String,
}

pub fn assess(state: &MarketState, weights: &AdaptiveWeights, cfg: &GateConfig) -> OverallAssessment {
    let primary = score(
        &vote(&Oscillators::from(state)),
        weights,
        cfg.trend_stability_threshold,
    );
    let market = assess_market_stability(state, cfg);
    let clarity = assess_trend_clarity(primary.direction, primary.stability_score, state, cfg);
    let alignment = timeframes::analyze(state, primary.direction, weights, cfg);

    OverallAssessment {
        is_stable: market.is_stable,
        stability_score: market.stability_score,
        is_clear: clarity.is_clear,
        clarity_score: clarity.clarity_score,
        volatility_ratio: market.volatility_ratio,
        timeframes_aligned: alignment.aligned,
        direction: primary.direction,
        trend_stability: primary.stability_score,
        timeframes: alignment.results,
        entry_trigger: alignment.entry_trigger,
        alignment_reason: alignment.reason,
    }
}
