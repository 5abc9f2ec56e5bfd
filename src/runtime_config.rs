// =============================================================================
// Runtime Configuration — gate thresholds and driver settings with atomic save
// =============================================================================
//
// Every admission threshold the gate applies lives in `GateConfig`; nothing in
// the pipeline hardcodes a cut-off.  `RuntimeConfig` wraps it together with
// the driver's polling and persistence settings.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_min_stability_score() -> f64 {
    0.6
}

fn default_min_clarity_score() -> f64 {
    0.65
}

fn default_max_volatility_ratio() -> f64 {
    0.08
}

fn default_confidence_threshold() -> f64 {
    75.0
}

fn default_min_risk_reward_ratio() -> f64 {
    2.0
}

fn default_base_lock_seconds() -> f64 {
    600.0
}

fn default_min_lock_seconds() -> f64 {
    300.0
}

fn default_max_lock_seconds() -> f64 {
    2400.0
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_trend_stability_threshold() -> f64 {
    0.7
}

fn default_stop_loss_atr_multiple() -> f64 {
    1.5
}

fn default_take_profit_atr_multiple() -> f64 {
    3.75
}

fn default_volatility_lock_factor() -> f64 {
    1200.0
}

fn default_stability_lock_factor() -> f64 {
    600.0
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M15, Timeframe::M5, Timeframe::M1]
}

fn default_min_entry_momentum_pct() -> f64 {
    0.05
}

fn default_learning_factor_floor() -> f64 {
    0.8
}

fn default_learning_factor_ceiling() -> f64 {
    1.2
}

fn default_cold_start_learning_factor() -> f64 {
    1.0
}

fn default_min_outcomes_for_learning() -> u32 {
    5
}

fn default_assets() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_min_poll_interval_ms() -> u64 {
    1_000
}

fn default_prune_interval_secs() -> u64 {
    60
}

fn default_weights_path() -> String {
    "adaptive_weights.json".to_string()
}

// =============================================================================
// Deployment profiles
// =============================================================================

/// Preset threshold bundles. `Standard` matches the defaults; `Strict` is the
/// tightest setting the gate is deployed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentProfile {
    Standard,
    Strict,
}

impl std::fmt::Display for DeploymentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::Strict => write!(f, "Strict"),
        }
    }
}

// =============================================================================
// GateConfig
// =============================================================================

/// Thresholds and formula constants for the signal gate, lock manager and
/// learning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    // --- Admission thresholds ------------------------------------------------

    /// Overall market stability must exceed this (0.6 – 0.75).
    #[serde(default = "default_min_stability_score")]
    pub min_stability_score: f64,

    /// Trend clarity must exceed this (0.65 – 0.80).
    #[serde(default = "default_min_clarity_score")]
    pub min_clarity_score: f64,

    /// `atr / price` must not exceed this (0.05 – 0.08).
    #[serde(default = "default_max_volatility_ratio")]
    pub max_volatility_ratio: f64,

    /// Minimum adjusted confidence, on the 0–99 scale (75 – 85).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Minimum reward/risk of the proposed stop and target (2.0 – 2.5).
    #[serde(default = "default_min_risk_reward_ratio")]
    pub min_risk_reward_ratio: f64,

    /// Winning bucket share required before a timeframe counts as trending.
    #[serde(default = "default_trend_stability_threshold")]
    pub trend_stability_threshold: f64,

    // --- Stop / target placement ---------------------------------------------

    /// Stop-loss distance in ATRs.
    #[serde(default = "default_stop_loss_atr_multiple")]
    pub stop_loss_atr_multiple: f64,

    /// Take-profit distance in ATRs.
    #[serde(default = "default_take_profit_atr_multiple")]
    pub take_profit_atr_multiple: f64,

    // --- Lock duration ---------------------------------------------------------

    #[serde(default = "default_base_lock_seconds")]
    pub base_lock_seconds: f64,

    #[serde(default = "default_min_lock_seconds")]
    pub min_lock_seconds: f64,

    #[serde(default = "default_max_lock_seconds")]
    pub max_lock_seconds: f64,

    /// Seconds of extra lock per unit of volatility ratio.
    #[serde(default = "default_volatility_lock_factor")]
    pub volatility_lock_factor: f64,

    /// Seconds of extra lock per unit of missing stability.
    #[serde(default = "default_stability_lock_factor")]
    pub stability_lock_factor: f64,

    // --- Timeframes -----------------------------------------------------------

    /// Timeframes that must all agree. The fastest one supplies the entry
    /// trigger.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,

    /// Minimum fast-EMA momentum (percent per bar) for an entry trigger.
    #[serde(default = "default_min_entry_momentum_pct")]
    pub min_entry_momentum_pct: f64,

    // --- Learning -------------------------------------------------------------

    /// Per-outcome weight nudge.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_learning_factor_floor")]
    pub learning_factor_floor: f64,

    #[serde(default = "default_learning_factor_ceiling")]
    pub learning_factor_ceiling: f64,

    /// Learning factor used until an asset has enough recorded outcomes.
    #[serde(default = "default_cold_start_learning_factor")]
    pub cold_start_learning_factor: f64,

    #[serde(default = "default_min_outcomes_for_learning")]
    pub min_outcomes_for_learning: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_stability_score: default_min_stability_score(),
            min_clarity_score: default_min_clarity_score(),
            max_volatility_ratio: default_max_volatility_ratio(),
            confidence_threshold: default_confidence_threshold(),
            min_risk_reward_ratio: default_min_risk_reward_ratio(),
            trend_stability_threshold: default_trend_stability_threshold(),
            stop_loss_atr_multiple: default_stop_loss_atr_multiple(),
            take_profit_atr_multiple: default_take_profit_atr_multiple(),
            base_lock_seconds: default_base_lock_seconds(),
            min_lock_seconds: default_min_lock_seconds(),
            max_lock_seconds: default_max_lock_seconds(),
            volatility_lock_factor: default_volatility_lock_factor(),
            stability_lock_factor: default_stability_lock_factor(),
            timeframes: default_timeframes(),
            min_entry_momentum_pct: default_min_entry_momentum_pct(),
            learning_rate: default_learning_rate(),
            learning_factor_floor: default_learning_factor_floor(),
            learning_factor_ceiling: default_learning_factor_ceiling(),
            cold_start_learning_factor: default_cold_start_learning_factor(),
            min_outcomes_for_learning: default_min_outcomes_for_learning(),
        }
    }
}

impl GateConfig {
    pub fn for_profile(profile: DeploymentProfile) -> Self {
        match profile {
            DeploymentProfile::Standard => Self::default(),
            DeploymentProfile::Strict => Self {
                min_stability_score: 0.75,
                min_clarity_score: 0.80,
                max_volatility_ratio: 0.05,
                confidence_threshold: 85.0,
                min_risk_reward_ratio: 2.5,
                ..Self::default()
            },
        }
    }

    /// Reject configurations the pipeline cannot run with: non-finite
    /// thresholds, inverted bounds or an empty timeframe list.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("min_stability_score", self.min_stability_score),
            ("min_clarity_score", self.min_clarity_score),
            ("max_volatility_ratio", self.max_volatility_ratio),
            ("confidence_threshold", self.confidence_threshold),
            ("min_risk_reward_ratio", self.min_risk_reward_ratio),
            ("trend_stability_threshold", self.trend_stability_threshold),
            ("stop_loss_atr_multiple", self.stop_loss_atr_multiple),
            ("take_profit_atr_multiple", self.take_profit_atr_multiple),
            ("base_lock_seconds", self.base_lock_seconds),
            ("min_lock_seconds", self.min_lock_seconds),
            ("max_lock_seconds", self.max_lock_seconds),
            ("volatility_lock_factor", self.volatility_lock_factor),
            ("stability_lock_factor", self.stability_lock_factor),
            ("min_entry_momentum_pct", self.min_entry_momentum_pct),
            ("learning_rate", self.learning_rate),
            ("learning_factor_floor", self.learning_factor_floor),
            ("learning_factor_ceiling", self.learning_factor_ceiling),
            ("cold_start_learning_factor", self.cold_start_learning_factor),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                bail!("gate.{name} must be finite, got {value}");
            }
        }

        if self.min_lock_seconds < 0.0 || self.min_lock_seconds > self.max_lock_seconds {
            bail!(
                "gate lock bounds out of order: min_lock_seconds={} max_lock_seconds={}",
                self.min_lock_seconds,
                self.max_lock_seconds
            );
        }
        if self.learning_factor_floor > self.learning_factor_ceiling {
            bail!(
                "gate learning factor bounds out of order: floor={} ceiling={}",
                self.learning_factor_floor,
                self.learning_factor_ceiling
            );
        }
        if self.stop_loss_atr_multiple <= 0.0 || self.take_profit_atr_multiple <= 0.0 {
            bail!("gate stop and target ATR multiples must be positive");
        }
        if self.learning_rate < 0.0 {
            bail!("gate.learning_rate must not be negative, got {}", self.learning_rate);
        }
        if self.timeframes.is_empty() {
            bail!("gate.timeframes must name at least one timeframe");
        }
        Ok(())
    }

    /// The fastest configured timeframe, which must carry the entry trigger.
    pub fn fastest_timeframe(&self) -> Option<Timeframe> {
        self.timeframes.iter().copied().min_by_key(|tf| tf.minutes())
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the gate process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Assets polled on every tick.
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Target tick period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lower bound on the sleep between ticks, however slow a tick was.
    #[serde(default = "default_min_poll_interval_ms")]
    pub min_poll_interval_ms: u64,

    /// How often expired locks are swept from the table.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Where adaptive weights are persisted between runs.
    #[serde(default = "default_weights_path")]
    pub weights_path: String,

    /// Gate thresholds.
    #[serde(default)]
    pub gate: GateConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            assets: default_assets(),
            poll_interval_ms: default_poll_interval_ms(),
            min_poll_interval_ms: default_min_poll_interval_ms(),
            prune_interval_secs: default_prune_interval_secs(),
            weights_path: default_weights_path(),
            gate: GateConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;
        config
            .gate
            .validate()
            .with_context(|| format!("invalid gate config in {}", path.display()))?;

        info!(
            path = %path.display(),
            assets = ?config.assets,
            poll_interval_ms = config.poll_interval_ms,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;
        write_atomic(path.as_ref(), &content)?;
        info!(path = %path.as_ref().display(), "runtime config saved (atomic)");
        Ok(())
    }
}

/// Write `content` to a temporary sibling of `path`, then rename it into
/// place.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    std::fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write tmp file {}", tmp_path.display()))?;

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename tmp file to {}", path.display()))?;

    Ok(())
}
