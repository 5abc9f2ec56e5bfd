// =============================================================================
// Adaptive Weight Store — outcome-driven indicator weights
// =============================================================================
//
// Holds one weight per indicator, read by the confluence scorer on every
// evaluation and nudged by outcome feedback.
//
// Invariants (checked after every mutation, panics on violation):
//   - every weight lies in [MIN_WEIGHT, MAX_WEIGHT]
//   - the weights sum to 1.0
//
// Readers take an `Arc` snapshot, so a concurrent outcome never exposes a
// half-renormalised set.
// =============================================================================

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runtime_config::write_atomic;
use crate::signals::votes::Indicator;
use crate::types::Outcome;

/// Floor for any single weight.
pub const MIN_WEIGHT: f64 = 0.05;
/// Ceiling for any single weight.
pub const MAX_WEIGHT: f64 = 0.4;

const SUM_TOLERANCE: f64 = 1e-9;
const BOUND_TOLERANCE: f64 = 1e-12;

// =============================================================================
// AdaptiveWeights
// =============================================================================

/// Indicator weights. Always normalised once published by the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWeights {
    pub rsi: f64,
    pub macd: f64,
    pub bollinger: f64,
    pub volume: f64,
    pub stochastic: f64,
    pub williams_r: f64,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self {
            rsi: 0.20,
            macd: 0.25,
            bollinger: 0.20,
            volume: 0.15,
            stochastic: 0.10,
            williams_r: 0.10,
        }
    }
}

impl AdaptiveWeights {
    pub fn get(&self, indicator: Indicator) -> f64 {
        self.values()[indicator.index()]
    }

    /// Weights in `Indicator::ALL` order.
    pub fn values(&self) -> [f64; 6] {
        [
            self.rsi,
            self.macd,
            self.bollinger,
            self.volume,
            self.stochastic,
            self.williams_r,
        ]
    }

    pub fn from_values(values: [f64; 6]) -> Self {
        Self {
            rsi: values[0],
            macd: values[1],
            bollinger: values[2],
            volume: values[3],
            stochastic: values[4],
            williams_r: values[5],
        }
    }

    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }

    /// Move every weight one `learning_rate` step: up on a win (capped at
    /// [`MAX_WEIGHT`]), down on a loss (floored at [`MIN_WEIGHT`]).
    /// The result is not normalised.
    pub fn nudged(&self, outcome: Outcome, learning_rate: f64) -> Self {
        let values = self.values().map(|w| match outcome {
            Outcome::Win => (w + learning_rate).min(MAX_WEIGHT),
            Outcome::Loss => (w - learning_rate).max(MIN_WEIGHT),
        });
        Self::from_values(values)
    }

    /// Rescale to sum 1.0 while keeping every weight inside the bounds.
    ///
    /// Finds the common factor `s` with `Σ clamp(w·s, MIN, MAX) = 1`. The
    /// clamped sum is monotone in `s`, so a bisection converges. A plain
    /// division by the sum would let large weights drift past [`MAX_WEIGHT`]
    /// after a run of losses.
    pub fn renormalized(&self) -> Self {
        let raw = self.values().map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
        let scaled = |s: f64| raw.map(|w| (w * s).clamp(MIN_WEIGHT, MAX_WEIGHT));
        let total = |s: f64| scaled(s).iter().sum::<f64>();

        let mut hi = 1.0;
        let mut grow = 0;
        while total(hi) < 1.0 && grow < 1_100 {
            hi *= 2.0;
            grow += 1;
        }
        if total(hi) < 1.0 - SUM_TOLERANCE {
            // Only zero weights: nothing to scale, split evenly.
            return Self::from_values([1.0 / 6.0; 6]);
        }

        let mut lo = 0.0;
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if total(mid) < 1.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let mut values = scaled(hi);
        // Hand the rounding residue to the weights that are not on a bound.
        let residual = 1.0 - values.iter().sum::<f64>();
        let free_mass: f64 = values
            .iter()
            .filter(|&&v| v > MIN_WEIGHT && v < MAX_WEIGHT)
            .sum();
        if free_mass > 0.0 {
            for v in values.iter_mut() {
                if *v > MIN_WEIGHT && *v < MAX_WEIGHT {
                    *v += residual * *v / free_mass;
                }
            }
        }
        Self::from_values(values)
    }

    /// `None` when the invariants hold, otherwise a description of the
    /// violation.
    pub fn invariant_violation(&self) -> Option<String> {
        for indicator in Indicator::ALL {
            let w = self.get(indicator);
            if !w.is_finite()
                || w < MIN_WEIGHT - BOUND_TOLERANCE
                || w > MAX_WEIGHT + BOUND_TOLERANCE
            {
                return Some(format!(
                    "weight for {} is {} (allowed {}..={})",
                    indicator, w, MIN_WEIGHT, MAX_WEIGHT
                ));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Some(format!("weights sum to {sum}, expected 1.0"));
        }
        None
    }

    fn assert_invariants(&self) {
        if let Some(violation) = self.invariant_violation() {
            panic!("adaptive weight invariant violated: {violation}");
        }
    }
}

/// Before/after record of one outcome applied to the weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightAdjustment {
    pub outcome: Outcome,
    pub before: AdaptiveWeights,
    /// Weights after the bounded step, before renormalisation.
    pub nudged: AdaptiveWeights,
    pub after: AdaptiveWeights,
}

// =============================================================================
// WeightStore
// =============================================================================

/// Shared owner of the current weights.
pub struct WeightStore {
    current: RwLock<Arc<AdaptiveWeights>>,
}

impl WeightStore {
    pub fn new(initial: AdaptiveWeights) -> Self {
        let initial = initial.renormalized();
        initial.assert_invariants();
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Cheap copy-on-read snapshot of the current weights.
    pub fn snapshot(&self) -> Arc<AdaptiveWeights> {
        self.current.read().clone()
    }

    /// Apply one outcome and publish the renormalised weights.
    pub fn apply_outcome(&self, outcome: Outcome, learning_rate: f64) -> WeightAdjustment {
        let mut current = self.current.write();
        let before = **current;
        let nudged = before.nudged(outcome, learning_rate);
        let after = nudged.renormalized();
        after.assert_invariants();
        *current = Arc::new(after);

        debug!(
            outcome = %outcome,
            learning_rate,
            rsi = after.rsi,
            macd = after.macd,
            bollinger = after.bollinger,
            stochastic = after.stochastic,
            "adaptive weights updated"
        );

        WeightAdjustment {
            outcome,
            before,
            nudged,
            after,
        }
    }

    /// Install externally persisted weights after validating them.
    pub fn restore(&self, weights: AdaptiveWeights) -> Result<()> {
        let values = weights.values();
        if values.iter().any(|w| !w.is_finite()) {
            bail!("restored weights contain a non-finite value: {weights:?}");
        }
        if values
            .iter()
            .any(|&w| w < MIN_WEIGHT - BOUND_TOLERANCE || w > MAX_WEIGHT + BOUND_TOLERANCE)
        {
            bail!("restored weights fall outside {MIN_WEIGHT}..={MAX_WEIGHT}: {weights:?}");
        }
        if (weights.sum() - 1.0).abs() > 1e-6 {
            bail!("restored weights sum to {}, expected 1.0", weights.sum());
        }

        let normalised = weights.renormalized();
        normalised.assert_invariants();
        *self.current.write() = Arc::new(normalised);
        info!(?normalised, "adaptive weights restored");
        Ok(())
    }

    /// Load weights from a JSON file and install them.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read weights from {}", path.display()))?;
        let weights: AdaptiveWeights = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse weights from {}", path.display()))?;
        self.restore(weights)
            .with_context(|| format!("rejected weights from {}", path.display()))
    }

    /// Persist the current weights with an atomic write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.snapshot();
        let content = serde_json::to_string_pretty(snapshot.as_ref())
            .context("failed to serialise adaptive weights")?;
        write_atomic(path.as_ref(), &content)?;
        info!(path = %path.as_ref().display(), "adaptive weights saved (atomic)");
        Ok(())
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new(AdaptiveWeights::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
