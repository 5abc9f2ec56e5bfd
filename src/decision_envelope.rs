// =============================================================================
// Decision Envelope — auditable record of every emit/abstain decision
// =============================================================================
//
// Each evaluation leaves exactly one `GateDecision`, whether a signal was
// emitted or the gate abstained, so every verdict can be audited later.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::signals::GateOutcome;
use crate::types::{AbstainReason, SignalType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Emit,
    Abstain,
}

/// Complete auditable record of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    pub asset_id: String,

    pub verdict: Verdict,

    /// Why the gate abstained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbstainReason>,

    /// Side of the emitted signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<SignalType>,

    /// Id of the emitted signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,

    /// RFC 3339 timestamp of when this decision was recorded.
    pub created_at: String,
}

impl GateDecision {
    pub fn emitted(asset_id: impl Into<String>, signal_type: SignalType, signal_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset_id.into(),
            verdict: Verdict::Emit,
            reason: None,
            signal_type: Some(signal_type),
            signal_id: Some(signal_id.into()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn abstained(asset_id: impl Into<String>, reason: AbstainReason) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset_id.into(),
            verdict: Verdict::Abstain,
            reason: Some(reason),
            signal_type: None,
            signal_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn from_outcome(asset_id: &str, outcome: &GateOutcome) -> Self {
        match outcome {
            GateOutcome::Emitted(signal) => Self::emitted(asset_id, signal.signal_type, signal.id.clone()),
            GateOutcome::Abstained { reason } => Self::abstained(asset_id, *reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstain_serializes_reason_only() {
        let d = GateDecision::abstained("ETHUSDT", AbstainReason::UnclearTrend);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["verdict"], "ABSTAIN");
        assert_eq!(json["reason"], "unclear_trend");
        assert!(json.get("signal_type").is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&d.created_at).is_ok());
    }

    #[test]
    fn decisions_get_unique_ids() {
        let a = GateDecision::abstained("A", AbstainReason::Locked);
        let b = GateDecision::abstained("A", AbstainReason::Locked);
        assert_ne!(a.id, b.id);
    }
}
