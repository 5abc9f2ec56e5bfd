// =============================================================================
// Signals Module
// =============================================================================
//
// Signal gating pipeline:
// - Per-indicator votes
// - Weighted confluence scoring, market stability and trend clarity
// - Multi-timeframe agreement and entry trigger
// - Ordered admission checks producing a Signal or an abstain reason

pub mod assessment;
pub mod confluence;
pub mod gate;
pub mod timeframes;
pub mod votes;

pub use assessment::{assess, OverallAssessment};
pub use confluence::{ConfluenceResult, MarketStability, TrendClarity};
pub use gate::{GateOutcome, Signal};
pub use timeframes::{EntryTrigger, TimeframeAlignment};
pub use votes::{Indicator, IndicatorVote, Sentiment, VoteSet};
