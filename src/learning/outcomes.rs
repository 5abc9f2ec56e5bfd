// =============================================================================
// Outcome Ledger — per-asset track record feeding the learning factor
// =============================================================================
//
// Every realized outcome reported for an asset is tallied here.  The gate
// turns an asset's hit rate into a confidence multiplier:
//
//   learning_factor = clamp(accuracy, floor, ceiling)   once enough outcomes
//                   = cold_start_learning_factor          before that
//
// The multiplier is a heuristic; all of its constants live in GateConfig.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::runtime_config::GateConfig;
use crate::types::{Outcome, OutcomeResult};

/// Track record for a single asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub outcomes: u64,
    pub wins: u64,
    pub losses: u64,
    /// Sum of reported P/L. Outcomes without a P/L contribute nothing.
    pub total_pnl: f64,
}

impl AssetRecord {
    pub fn record(&mut self, result: &OutcomeResult) {
        self.outcomes += 1;
        match result.outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
        }
        if let Some(pnl) = result.pnl.filter(|p| p.is_finite()) {
            self.total_pnl += pnl;
        }
    }

    /// Fraction of outcomes that were wins. `None` before the first outcome.
    pub fn accuracy(&self) -> Option<f64> {
        (self.outcomes > 0).then(|| self.wins as f64 / self.outcomes as f64)
    }

    pub fn average_pnl(&self) -> Option<f64> {
        (self.outcomes > 0).then(|| self.total_pnl / self.outcomes as f64)
    }
}

/// Aggregate view across all assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub assets: usize,
    pub outcomes: u64,
    pub wins: u64,
    pub accuracy: Option<f64>,
    pub total_pnl: f64,
}

pub struct OutcomeLedger {
    records: RwLock<HashMap<String, AssetRecord>>,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, asset_id: &str, result: &OutcomeResult) -> AssetRecord {
        let mut records = self.records.write();
        let entry = records.entry(asset_id.to_string()).or_default();
        entry.record(result);
        entry.clone()
    }

    pub fn get(&self, asset_id: &str) -> Option<AssetRecord> {
        self.records.read().get(asset_id).cloned()
    }

    pub fn accuracy(&self, asset_id: &str) -> Option<f64> {
        self.records.read().get(asset_id).and_then(AssetRecord::accuracy)
    }

    /// Confidence multiplier for `asset_id`.
    pub fn learning_factor(&self, asset_id: &str, cfg: &GateConfig) -> f64 {
        let records = self.records.read();
        match records.get(asset_id) {
            Some(record) if record.outcomes >= u64::from(cfg.min_outcomes_for_learning) => record
                .accuracy()
                .map(|acc| acc.max(cfg.learning_factor_floor).min(cfg.learning_factor_ceiling))
                .unwrap_or(cfg.cold_start_learning_factor),
            _ => cfg.cold_start_learning_factor,
        }
    }

    pub fn summary(&self) -> LedgerSummary {
        let records = self.records.read();
        let outcomes: u64 = records.values().map(|r| r.outcomes).sum();
        let wins: u64 = records.values().map(|r| r.wins).sum();
        LedgerSummary {
            assets: records.len(),
            outcomes,
            wins,
            accuracy: (outcomes > 0).then(|| wins as f64 / outcomes as f64),
            total_pnl: records.values().map(|r| r.total_pnl).sum(),
        }
    }
}

impl Default for OutcomeLedger {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_and_accuracy() {
        let ledger = OutcomeLedger::new();
        assert!(ledger.accuracy("BTCUSDT").is_none());
        ledger.record("BTCUSDT", &OutcomeResult::win().with_pnl(12.0));
        ledger.record("BTCUSDT", &OutcomeResult::loss().with_pnl(-4.0));
        ledger.record("BTCUSDT", &OutcomeResult::win());

        let rec = ledger.get("BTCUSDT").unwrap();
        assert_eq!(rec.outcomes, 3);
        assert_eq!(rec.wins, 2);
        assert_eq!(rec.losses, 1);
        assert!((rec.total_pnl - 8.0).abs() < 1e-12);
        assert!((rec.accuracy().unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn records_are_per_asset() {
        let ledger = OutcomeLedger::new();
        ledger.record("BTCUSDT", &OutcomeResult::win());
        ledger.record("ETHUSDT", &OutcomeResult::loss());
        assert_eq!(ledger.accuracy("BTCUSDT"), Some(1.0));
        assert_eq!(ledger.accuracy("ETHUSDT"), Some(0.0));
    }

    #[test]
    fn cold_start_factor_until_enough_outcomes() {
        let cfg = GateConfig::default();
        let ledger = OutcomeLedger::new();
        assert_eq!(ledger.learning_factor("SOLUSDT", &cfg), cfg.cold_start_learning_factor);
        for _ in 0..4 {
            ledger.record("SOLUSDT", &OutcomeResult::loss());
        }
        assert_eq!(ledger.learning_factor("SOLUSDT", &cfg), cfg.cold_start_learning_factor);
        ledger.record("SOLUSDT", &OutcomeResult::loss());
        // 0% accuracy clamps to the floor.
        assert!((ledger.learning_factor("SOLUSDT", &cfg) - cfg.learning_factor_floor).abs() < 1e-12);
    }

    #[test]
    fn learning_factor_tracks_accuracy_within_bounds() {
        let cfg = GateConfig::default();
        let ledger = OutcomeLedger::new();
        for i in 0..10 {
            let r = if i < 9 { OutcomeResult::win() } else { OutcomeResult::loss() };
            ledger.record("XRPUSDT", &r);
        }
        assert!((ledger.learning_factor("XRPUSDT", &cfg) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn inverted_learning_bounds_do_not_panic() {
        let cfg = GateConfig {
            learning_factor_floor: 1.3,
            ..GateConfig::default()
        };
        let ledger = OutcomeLedger::new();
        for _ in 0..5 {
            ledger.record("XRPUSDT", &OutcomeResult::win());
        }
        assert_eq!(ledger.learning_factor("XRPUSDT", &cfg), cfg.learning_factor_ceiling);
    }

    #[test]
    fn summary_aggregates_assets() {
        let ledger = OutcomeLedger::new();
        ledger.record("A", &OutcomeResult::win().with_pnl(3.0));
        ledger.record("B", &OutcomeResult::loss().with_pnl(f64::NAN));
        let s = ledger.summary();
        assert_eq!(s.assets, 2);
        assert_eq!(s.outcomes, 2);
        assert_eq!(s.accuracy, Some(0.5));
        assert!((s.total_pnl - 3.0).abs() < 1e-12);
    }
}
