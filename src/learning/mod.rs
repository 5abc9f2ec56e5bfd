// =============================================================================
// Learning Module
// =============================================================================
//
// Outcome feedback loop:
// - Adaptive indicator weights (bounded, renormalised after every outcome)
// - Per-asset outcome ledger driving the confidence learning factor

pub mod outcomes;
pub mod weights;

pub use outcomes::{AssetRecord, LedgerSummary, OutcomeLedger};
pub use weights::{AdaptiveWeights, WeightAdjustment, WeightStore, MAX_WEIGHT, MIN_WEIGHT};
