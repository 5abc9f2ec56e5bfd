// =============================================================================
// Vote Engine — per-indicator directional votes
// =============================================================================
//
// Converts one set of oscillator readings into four fixed votes (RSI, MACD,
// Bollinger, Stochastic).  Thresholds are evaluated in the listed order, so
// the first matching band wins.
//
// A non-finite reading never fails the evaluation: it becomes a neutral vote
// with confidence 0.5 and a data-quality warning.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{MarketState, TimeframeReading};

/// Indicators that carry an adaptive weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Rsi,
    Macd,
    Bollinger,
    Volume,
    Stochastic,
    WilliamsR,
}

impl Indicator {
    pub const ALL: [Indicator; 6] = [
        Indicator::Rsi,
        Indicator::Macd,
        Indicator::Bollinger,
        Indicator::Volume,
        Indicator::Stochastic,
        Indicator::WilliamsR,
    ];

    /// Position of this indicator in weight arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Rsi => 0,
            Self::Macd => 1,
            Self::Bollinger => 2,
            Self::Volume => 3,
            Self::Stochastic => 4,
            Self::WilliamsR => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::Macd => "macd",
            Self::Bollinger => "bollinger",
            Self::Volume => "volume",
            Self::Stochastic => "stochastic",
            Self::WilliamsR => "williams_r",
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What an indicator says about the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
    Overbought,
    Oversold,
}

/// Which confluence bucket a sentiment feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    /// Oversold reads as a long setup, overbought as a short one.
    pub fn bucket(self) -> Bucket {
        match self {
            Self::Bullish | Self::Oversold => Bucket::Bullish,
            Self::Bearish | Self::Overbought => Bucket::Bearish,
            Self::Neutral => Bucket::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorVote {
    pub indicator: Indicator,
    pub sentiment: Sentiment,
    pub confidence: f64,
}

impl IndicatorVote {
    fn new(indicator: Indicator, sentiment: Sentiment, confidence: f64) -> Self {
        Self { indicator, sentiment, confidence }
    }

    fn data_gap(indicator: Indicator) -> Self {
        Self::new(indicator, Sentiment::Neutral, 0.5)
    }
}

/// Votes always come in this fixed order: RSI, MACD, Bollinger, Stochastic.
pub type VoteSet = [IndicatorVote; 4];

/// The oscillator readings the vote rules look at, for one timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillators {
    pub price: f64,
    pub rsi: f64,
    pub macd: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub stochastic_k: f64,
}

impl From<&MarketState> for Oscillators {
    fn from(state: &MarketState) -> Self {
        Self {
            price: state.price,
            rsi: state.rsi,
            macd: state.macd,
            bollinger_upper: state.bollinger_upper,
            bollinger_lower: state.bollinger_lower,
            stochastic_k: state.stochastic_k,
        }
    }
}

impl Oscillators {
    /// Readings for a timeframe, priced at the snapshot's current price.
    pub fn for_timeframe(reading: &TimeframeReading, price: f64) -> Self {
        Self {
            price,
            rsi: reading.rsi,
            macd: reading.macd,
            bollinger_upper: reading.bollinger_upper,
            bollinger_lower: reading.bollinger_lower,
            stochastic_k: reading.stochastic_k,
        }
    }
}

/// Cast the four indicator votes for `readings`.
pub fn vote(readings: &Oscillators) -> VoteSet {
    [
        rsi_vote(readings.rsi),
        macd_vote(readings.macd),
        bollinger_vote(readings.price, readings.bollinger_upper, readings.bollinger_lower),
        stochastic_vote(readings.stochastic_k),
    ]
}

fn rsi_vote(rsi: f64) -> IndicatorVote {
    if !rsi.is_finite() {
        warn!(indicator = "rsi", value = rsi, "data quality: non-finite reading, voting neutral");
        return IndicatorVote::data_gap(Indicator::Rsi);
    }
    let (sentiment, confidence) = if rsi > 70.0 {
        (Sentiment::Overbought, 0.8)
    } else if rsi < 30.0 {
        (Sentiment::Oversold, 0.8)
    } else if (45.0..=55.0).contains(&rsi) {
        (Sentiment::Neutral, 0.6)
    } else if rsi > 55.0 {
        (Sentiment::Bullish, 0.7)
    } else {
        (Sentiment::Bearish, 0.7)
    };
    IndicatorVote::new(Indicator::Rsi, sentiment, confidence)
}

fn macd_vote(macd: f64) -> IndicatorVote {
    if !macd.is_finite() {
        warn!(indicator = "macd", value = macd, "data quality: non-finite reading, voting neutral");
        return IndicatorVote::data_gap(Indicator::Macd);
    }
    let (sentiment, confidence) = if macd > 0.0 {
        (Sentiment::Bullish, 0.8)
    } else if macd < 0.0 {
        (Sentiment::Bearish, 0.8)
    } else {
        (Sentiment::Neutral, 0.5)
    };
    IndicatorVote::new(Indicator::Macd, sentiment, confidence)
}

fn bollinger_vote(price: f64, upper: f64, lower: f64) -> IndicatorVote {
    if !(price.is_finite() && upper.is_finite() && lower.is_finite()) {
        warn!(
            indicator = "bollinger",
            price, upper, lower, "data quality: non-finite reading, voting neutral"
        );
        return IndicatorVote::data_gap(Indicator::Bollinger);
    }
    let (sentiment, confidence) = if price > upper {
        (Sentiment::Overbought, 0.9)
    } else if price < lower {
        (Sentiment::Oversold, 0.9)
    } else {
        (Sentiment::Neutral, 0.6)
    };
    IndicatorVote::new(Indicator::Bollinger, sentiment, confidence)
}

fn stochastic_vote(k: f64) -> IndicatorVote {
    if !k.is_finite() {
        warn!(indicator = "stochastic", value = k, "data quality: non-finite reading, voting neutral");
        return IndicatorVote::data_gap(Indicator::Stochastic);
    }
    let (sentiment, confidence) = if k > 80.0 {
        (Sentiment::Overbought, 0.7)
    } else if k < 20.0 {
        (Sentiment::Oversold, 0.7)
    } else {
        (Sentiment::Neutral, 0.5)
    };
    IndicatorVote::new(Indicator::Stochastic, sentiment, confidence)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(rsi: f64, macd: f64, stochastic_k: f64) -> Oscillators {
        Oscillators {
            price: 100.0,
            rsi,
            macd,
            bollinger_upper: 102.0,
            bollinger_lower: 98.0,
            stochastic_k,
        }
    }

    #[test]
    fn rsi_bands() {
        assert_eq!(rsi_vote(75.0).sentiment, Sentiment::Overbought);
        assert_eq!(rsi_vote(25.0).sentiment, Sentiment::Oversold);
        assert_eq!(rsi_vote(45.0).sentiment, Sentiment::Neutral);
        assert_eq!(rsi_vote(55.0).sentiment, Sentiment::Neutral);
        assert_eq!(rsi_vote(60.0), IndicatorVote::new(Indicator::Rsi, Sentiment::Bullish, 0.7));
        assert_eq!(rsi_vote(40.0), IndicatorVote::new(Indicator::Rsi, Sentiment::Bearish, 0.7));
        // Boundaries belong to the inner bands.
        assert_eq!(rsi_vote(70.0).sentiment, Sentiment::Bullish);
        assert_eq!(rsi_vote(30.0).sentiment, Sentiment::Bearish);
    }

    #[test]
    fn macd_sign_decides() {
        assert_eq!(macd_vote(0.4).sentiment, Sentiment::Bullish);
        assert_eq!(macd_vote(-0.1).sentiment, Sentiment::Bearish);
        let flat = macd_vote(0.0);
        assert_eq!(flat.sentiment, Sentiment::Neutral);
        assert!((flat.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_breakouts() {
        assert_eq!(bollinger_vote(103.0, 102.0, 98.0).sentiment, Sentiment::Overbought);
        assert_eq!(bollinger_vote(97.0, 102.0, 98.0).sentiment, Sentiment::Oversold);
        let inside = bollinger_vote(100.0, 102.0, 98.0);
        assert_eq!(inside.sentiment, Sentiment::Neutral);
        assert!((inside.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn stochastic_extremes() {
        assert_eq!(stochastic_vote(85.0).sentiment, Sentiment::Overbought);
        assert_eq!(stochastic_vote(18.0).sentiment, Sentiment::Oversold);
        assert_eq!(stochastic_vote(50.0).sentiment, Sentiment::Neutral);
    }

    #[test]
    fn vote_set_has_fixed_order() {
        let votes = vote(&readings(25.0, 0.4, 18.0));
        let order: Vec<Indicator> = votes.iter().map(|v| v.indicator).collect();
        assert_eq!(
            order,
            vec![Indicator::Rsi, Indicator::Macd, Indicator::Bollinger, Indicator::Stochastic]
        );
        assert_eq!(votes[0].sentiment, Sentiment::Oversold);
        assert_eq!(votes[1].sentiment, Sentiment::Bullish);
        assert_eq!(votes[2].sentiment, Sentiment::Neutral);
        assert_eq!(votes[3].sentiment, Sentiment::Oversold);
    }

    #[test]
    fn nan_readings_vote_neutral() {
        let mut gappy = readings(f64::NAN, f64::NAN, f64::INFINITY);
        gappy.bollinger_upper = f64::NAN;
        let votes = vote(&gappy);
        for v in votes {
            assert_eq!(v.sentiment, Sentiment::Neutral);
            assert!((v.confidence - 0.5).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn sentiment_buckets() {
        assert_eq!(Sentiment::Oversold.bucket(), Bucket::Bullish);
        assert_eq!(Sentiment::Overbought.bucket(), Bucket::Bearish);
        assert_eq!(Sentiment::Neutral.bucket(), Bucket::Neutral);
    }

    #[test]
    fn indicator_indices_are_dense() {
        for (i, ind) in Indicator::ALL.iter().enumerate() {
            assert_eq!(ind.index(), i);
        }
    }
}
