// =============================================================================
// Confluence Gate — conservative multi-timeframe signal gating
// =============================================================================
//
// Indicator snapshots flow through votes, weighted confluence scoring and
// seven ordered admission checks.  Emitted signals lock their asset for a
// volatility-dependent window; realized outcomes feed back into the
// indicator weights.
// =============================================================================

pub mod decision_envelope;
pub mod driver;
pub mod engine;
pub mod learning;
pub mod lock_manager;
pub mod runtime_config;
pub mod signals;
pub mod types;

pub use engine::SignalEngine;
pub use runtime_config::{DeploymentProfile, GateConfig, RuntimeConfig};
pub use signals::{GateOutcome, Signal};
pub use types::{AbstainReason, MarketState, Outcome, OutcomeResult};
