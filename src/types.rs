// =============================================================================
// Shared types used across the confluence gate
// =============================================================================

use serde::{Deserialize, Deserializer, Serialize};

/// Unix time in (fractional) seconds.
pub type Timestamp = f64;

/// Current wall-clock time as a [`Timestamp`].
pub fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn missing_value() -> f64 {
    f64::NAN
}

/// Indicator feeds publish `null` for values they could not compute; those
/// become NaN and are handled as data gaps downstream.
fn nullable_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

// =============================================================================
// Enumerations
// =============================================================================

/// Chart resolution a set of indicator readings was computed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "1m")]
    M1,
}

impl Timeframe {
    pub fn minutes(self) -> u32 {
        match self {
            Self::M15 => 15,
            Self::M5 => 5,
            Self::M1 => 1,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::M15 => write!(f, "15m"),
            Self::M5 => write!(f, "5m"),
            Self::M1 => write!(f, "1m"),
        }
    }
}

/// Direction produced by the confluence scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Sideways,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uptrend => write!(f, "uptrend"),
            Self::Downtrend => write!(f, "downtrend"),
            Self::Sideways => write!(f, "sideways"),
        }
    }
}

/// Side of an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    /// The trend a signal of this side must be riding.
    pub fn direction(self) -> TrendDirection {
        match self {
            Self::Buy => TrendDirection::Uptrend,
            Self::Sell => TrendDirection::Downtrend,
        }
    }

    pub fn from_direction(direction: TrendDirection) -> Option<Self> {
        match direction {
            TrendDirection::Uptrend => Some(Self::Buy),
            TrendDirection::Downtrend => Some(Self::Sell),
            TrendDirection::Sideways => None,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Why the gate declined to emit. These are normal outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    Locked,
    UnstableMarket,
    UnclearTrend,
    ExcessiveVolatility,
    TimeframesNotAligned,
    LowConfidence,
    PoorRiskReward,
}

impl AbstainReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::UnstableMarket => "unstable_market",
            Self::UnclearTrend => "unclear_trend",
            Self::ExcessiveVolatility => "excessive_volatility",
            Self::TimeframesNotAligned => "timeframes_not_aligned",
            Self::LowConfidence => "low_confidence",
            Self::PoorRiskReward => "poor_risk_reward",
        }
    }
}

impl std::fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Realized result of a previously emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win => write!(f, "Win"),
            Self::Loss => write!(f, "Loss"),
        }
    }
}

/// Feedback delivered by the external outcome evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeResult {
    pub outcome: Outcome,
    /// Realized profit/loss, when the evaluator knows it.
    #[serde(default)]
    pub pnl: Option<f64>,
}

impl OutcomeResult {
    pub fn win() -> Self {
        Self { outcome: Outcome::Win, pnl: None }
    }

    pub fn loss() -> Self {
        Self { outcome: Outcome::Loss, pnl: None }
    }

    pub fn with_pnl(mut self, pnl: f64) -> Self {
        self.pnl = Some(pnl);
        self
    }
}

// =============================================================================
// Market snapshots
// =============================================================================

/// Indicator readings for one timeframe, computed at that timeframe's periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReading {
    pub timeframe: Timeframe,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub rsi: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub macd: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub bollinger_upper: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub bollinger_lower: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub stochastic_k: f64,
    /// Fast EMA on the latest closed bar.
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub ema_fast: f64,
    /// Slow EMA on the latest closed bar.
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub ema_slow: f64,
    /// Fast EMA one bar earlier.
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub prev_ema_fast: f64,
    /// Slow EMA one bar earlier.
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub prev_ema_slow: f64,
}

/// Immutable per-asset snapshot handed in by the indicator builder each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub asset_id: String,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub price: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub rsi: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub macd: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub bollinger_upper: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub bollinger_lower: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub stochastic_k: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub williams_r: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub atr: f64,
    #[serde(default = "missing_value", deserialize_with = "nullable_f64")]
    pub volume_sma: f64,
    #[serde(default)]
    pub timestamp: Timestamp,
    /// Per-timeframe readings used for the cross-timeframe agreement check.
    #[serde(default)]
    pub timeframes: Vec<TimeframeReading>,
}

impl MarketState {
    /// ATR relative to price. NaN or infinite when the inputs are unusable.
    pub fn volatility_ratio(&self) -> f64 {
        self.atr / self.price
    }

    /// Position of the price inside the Bollinger envelope (0 = lower band,
    /// 1 = upper band). `None` when the band is degenerate or missing.
    pub fn bollinger_position(&self) -> Option<f64> {
        let width = self.bollinger_upper - self.bollinger_lower;
        if !width.is_finite() || width <= 0.0 || !self.price.is_finite() {
            return None;
        }
        Some((self.price - self.bollinger_lower) / width)
    }

    pub fn reading(&self, timeframe: Timeframe) -> Option<&TimeframeReading> {
        self.timeframes.iter().find(|r| r.timeframe == timeframe)
    }
}
