// =============================================================================
// Multi-Timeframe Alignment
// =============================================================================
//
// Scores every configured timeframe independently with the same confluence
// procedure as the primary snapshot, then applies a strict all-agree rule:
//
//   aligned = every configured timeframe is present
//             AND every one of them trends in the primary direction
//             AND the fastest timeframe shows an entry trigger
//
// Entry trigger (fastest timeframe, uptrend shown; downtrend mirrors it):
//   ema_fast > ema_slow
//   (ema_fast - ema_slow) > (prev_ema_fast - prev_ema_slow)   fresh cross or widening
//   (ema_fast - prev_ema_fast) / prev_ema_fast * 100 >= min_entry_momentum_pct

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::learning::AdaptiveWeights;
use crate::runtime_config::GateConfig;
use crate::signals::confluence::{score, ConfluenceResult};
use crate::signals::votes::{vote, Oscillators};
use crate::types::{MarketState, Timeframe, TimeframeReading, TrendDirection};

/// Evidence that the fast timeframe offers an actionable entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTrigger {
    pub timeframe: Timeframe,
    pub direction: TrendDirection,
    /// True when the fast EMA was on the other side of the slow EMA one bar
    /// earlier.
    pub fresh_cross: bool,
    /// Fast-EMA change over the last bar, in percent.
    pub momentum_pct: f64,
}

/// Result of the cross-timeframe agreement check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAlignment {
    pub results: Vec<ConfluenceResult>,
    pub missing: Vec<Timeframe>,
    pub entry_trigger: Option<EntryTrigger>,
    pub aligned: bool,
    pub reason: String,
}

/// Score one timeframe reading.
pub fn score_timeframe(
    reading: &TimeframeReading,
    price: f64,
    weights: &AdaptiveWeights,
    cfg: &GateConfig,
) -> ConfluenceResult {
    let votes = vote(&Oscillators::for_timeframe(reading, price));
    let mut result = score(&votes, weights, cfg.trend_stability_threshold);
    result.timeframe = Some(reading.timeframe);
    result
}

/// Check the fast/slow EMA pair of `reading` for an entry in `direction`.
pub fn entry_trigger(
    reading: &TimeframeReading,
    direction: TrendDirection,
    min_momentum_pct: f64,
) -> Option<EntryTrigger> {
    let sign = match direction {
        TrendDirection::Uptrend => 1.0,
        TrendDirection::Downtrend => -1.0,
        TrendDirection::Sideways => return None,
    };

    let inputs = [
        reading.ema_fast,
        reading.ema_slow,
        reading.prev_ema_fast,
        reading.prev_ema_slow,
    ];
    if inputs.iter().any(|v| !v.is_finite()) || reading.prev_ema_fast.abs() <= f64::EPSILON {
        return None;
    }

    let spread = sign * (reading.ema_fast - reading.ema_slow);
    let prev_spread = sign * (reading.prev_ema_fast - reading.prev_ema_slow);
    let momentum_pct = (reading.ema_fast - reading.prev_ema_fast) / reading.prev_ema_fast * 100.0;

    if spread <= 0.0 || spread <= prev_spread || sign * momentum_pct < min_momentum_pct {
        return None;
    }

    Some(EntryTrigger {
        timeframe: reading.timeframe,
        direction,
        fresh_cross: prev_spread <= 0.0,
        momentum_pct,
    })
}

/// Apply the all-agree rule for `direction` across the configured timeframes.
pub fn analyze(
    state: &MarketState,
    direction: TrendDirection,
    weights: &AdaptiveWeights,
    cfg: &GateConfig,
) -> TimeframeAlignment {
    let mut results = Vec::with_capacity(cfg.timeframes.len());
    let mut missing = Vec::new();

    for &timeframe in &cfg.timeframes {
        match state.reading(timeframe) {
            Some(reading) => results.push(score_timeframe(reading, state.price, weights, cfg)),
            None => missing.push(timeframe),
        }
    }

    let entry_trigger = cfg
        .fastest_timeframe()
        .and_then(|tf| state.reading(tf))
        .and_then(|reading| entry_trigger(reading, direction, cfg.min_entry_momentum_pct));

    let disagreeing: Vec<String> = results
        .iter()
        .filter(|r| r.direction != direction)
        .map(|r| format!("{}={}", r.label(), r.direction))
        .collect();

    let (aligned, reason) = if cfg.timeframes.is_empty() {
        (false, "no timeframes configured".to_string())
    } else if direction == TrendDirection::Sideways {
        (false, "primary trend is sideways".to_string())
    } else if !missing.is_empty() {
        let labels: Vec<String> = missing.iter().map(|tf| tf.to_string()).collect();
        (false, format!("missing readings for {}", labels.join(", ")))
    } else if !disagreeing.is_empty() {
        (
            false,
            format!("{} disagree with {}", disagreeing.join(", "), direction),
        )
    } else if entry_trigger.is_none() {
        (false, "no entry trigger on the fastest timeframe".to_string())
    } else {
        (true, format!("all {} timeframes {}", results.len(), direction))
    };

    debug!(
        asset = %state.asset_id,
        direction = %direction,
        aligned,
        reason = %reason,
        "timeframe alignment checked"
    );

    TimeframeAlignment {
        results,
        missing,
        entry_trigger,
        aligned,
        reason,
    }
}

// =============================================================================
// Tests
// =============================================================================
