// =============================================================================
// Lock Manager — per-asset cool-down after every emitted signal
// =============================================================================
//
// After a signal is emitted for an asset, that asset is locked until
// `locked_until`.  The lock is held while `now <= locked_until` and is gone
// once `now > locked_until`; expiry is lazy, pruning only reclaims memory.
//
//   duration = clamp(base + volatility * k_vol + (1 - stability) * k_stab,
//                    min_lock, max_lock)
//
// Volatile or unstable markets therefore keep an asset quiet for longer.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runtime_config::GateConfig;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalLock {
    pub locked_until: Timestamp,
}

pub struct LockManager {
    locks: RwLock<HashMap<String, SignalLock>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_locked(&self, asset_id: &str, now: Timestamp) -> bool {
        self.locked_until(asset_id, now).is_some()
    }

    /// Expiry of the active lock on `asset_id`, if any.
    pub fn locked_until(&self, asset_id: &str, now: Timestamp) -> Option<Timestamp> {
        self.locks
            .read()
            .get(asset_id)
            .map(|lock| lock.locked_until)
            .filter(|until| now <= *until)
    }

    /// Lock `asset_id` for `duration_secs` from `now`, replacing any existing
    /// lock. Returns the new expiry.
    pub fn acquire(&self, asset_id: &str, duration_secs: f64, now: Timestamp) -> Timestamp {
        let locked_until = now + duration_secs;
        assert_valid_expiry(asset_id, locked_until);
        self.locks
            .write()
            .insert(asset_id.to_string(), SignalLock { locked_until });
        info!(asset = %asset_id, locked_until, duration_secs, "signal lock acquired");
        locked_until
    }

    /// Install a lock only if the asset is not locked at `now`. The check and
    /// the insert happen under one write guard, so of two concurrent emitters
    /// exactly one wins.
    pub fn try_acquire(&self, asset_id: &str, locked_until: Timestamp, now: Timestamp) -> bool {
        assert_valid_expiry(asset_id, locked_until);
        let mut locks = self.locks.write();
        if let Some(existing) = locks.get(asset_id) {
            if now <= existing.locked_until {
                debug!(
                    asset = %asset_id,
                    held_until = existing.locked_until,
                    "lock already held, emission dropped"
                );
                return false;
            }
        }
        locks.insert(asset_id.to_string(), SignalLock { locked_until });
        info!(asset = %asset_id, locked_until, "signal lock acquired");
        true
    }

    /// Drop expired locks. Returns how many were removed.
    pub fn prune_expired(&self, now: Timestamp) -> usize {
        let mut locks = self.locks.write();
        let before = locks.len();
        locks.retain(|_, lock| now <= lock.locked_until);
        let pruned = before - locks.len();
        if pruned > 0 {
            debug!(pruned, remaining = locks.len(), "expired signal locks pruned");
        }
        pruned
    }

    /// Number of locks still held at `now`.
    pub fn active_count(&self, now: Timestamp) -> usize {
        self.locks
            .read()
            .values()
            .filter(|lock| now <= lock.locked_until)
            .count()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

fn assert_valid_expiry(asset_id: &str, locked_until: Timestamp) {
    assert!(
        locked_until.is_finite() && locked_until >= 0.0,
        "invalid lock expiry {locked_until} for {asset_id}"
    );
}

/// Lock length in seconds for a signal emitted under these conditions.
pub fn lock_duration(volatility_ratio: f64, stability_score: f64, cfg: &GateConfig) -> f64 {
    if !volatility_ratio.is_finite() || !stability_score.is_finite() {
        return cfg.max_lock_seconds;
    }
    let raw = cfg.base_lock_seconds
        + volatility_ratio.max(0.0) * cfg.volatility_lock_factor
        + (1.0 - stability_score) * cfg.stability_lock_factor;
    // Never panics, even on inverted bounds.
    raw.max(cfg.min_lock_seconds).min(cfg.max_lock_seconds)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn inverted_lock_bounds_do_not_panic() {
        let cfg = GateConfig {
            min_lock_seconds: 3000.0,
            ..GateConfig::default()
        };
        assert_eq!(lock_duration(0.01, 0.85, &cfg), cfg.max_lock_seconds);
    }

    #[test]
    fn lock_holds_through_expiry_instant() {
        let locks = LockManager::new();
        let t = 1_700_000_000.0;
        let until = locks.acquire("BTCUSDT", 600.0, t);
        assert_eq!(until, t + 600.0);
        assert!(locks.is_locked("BTCUSDT", t + 1.0));
        assert!(locks.is_locked("BTCUSDT", t + 600.0));
        assert!(!locks.is_locked("BTCUSDT", t + 601.0));
        assert!(!locks.is_locked("ETHUSDT", t));
    }

    #[test]
    fn acquire_overwrites_existing_lock() {
        let locks = LockManager::new();
        locks.acquire("BTCUSDT", 2400.0, 0.0);
        locks.acquire("BTCUSDT", 300.0, 10.0);
        assert_eq!(locks.locked_until("BTCUSDT", 10.0), Some(310.0));
    }

    #[test]
    fn try_acquire_refuses_while_locked() {
        let locks = LockManager::new();
        assert!(locks.try_acquire("SOLUSDT", 600.0, 0.0));
        assert!(!locks.try_acquire("SOLUSDT", 900.0, 300.0));
        assert_eq!(locks.locked_until("SOLUSDT", 300.0), Some(600.0));
        // Expired locks can be replaced.
        assert!(locks.try_acquire("SOLUSDT", 1300.0, 700.0));
    }

    #[test]
    fn concurrent_try_acquire_has_one_winner() {
        let locks = Arc::new(LockManager::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                std::thread::spawn(move || locks.try_acquire("BNBUSDT", 600.0, 0.0))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn prune_drops_only_expired() {
        let locks = LockManager::new();
        locks.acquire("A", 100.0, 0.0);
        locks.acquire("B", 1000.0, 0.0);
        assert_eq!(locks.prune_expired(500.0), 1);
        assert_eq!(locks.active_count(500.0), 1);
        assert!(locks.is_locked("B", 500.0));
        assert_eq!(locks.prune_expired(500.0), 0);
    }

    #[test]
    #[should_panic(expected = "invalid lock expiry")]
    fn negative_expiry_panics() {
        LockManager::new().acquire("A", -10.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "invalid lock expiry")]
    fn nan_expiry_panics() {
        LockManager::new().try_acquire("A", f64::NAN, 0.0);
    }

    #[test]
    fn duration_formula_and_bounds() {
        let cfg = GateConfig::default();
        // 600 + 0.01*1200 + 0.2*600 = 732
        assert!((lock_duration(0.01, 0.8, &cfg) - 732.0).abs() < 1e-9);
        assert_eq!(lock_duration(0.0, 1.5, &cfg), cfg.min_lock_seconds);
        assert_eq!(lock_duration(2.0, 0.0, &cfg), cfg.max_lock_seconds);
        assert_eq!(lock_duration(f64::NAN, 0.8, &cfg), cfg.max_lock_seconds);
        assert_eq!(lock_duration(f64::INFINITY, 0.8, &cfg), cfg.max_lock_seconds);
    }

    #[test]
    fn duration_is_monotone_in_volatility() {
        let cfg = GateConfig::default();
        for stability in [0.0, 0.3, 0.6, 0.9, 1.0] {
            let mut prev = lock_duration(0.0, stability, &cfg);
            for step in 1..=200 {
                let d = lock_duration(step as f64 * 0.01, stability, &cfg);
                assert!(d >= prev, "duration fell at vol={} stab={}", step as f64 * 0.01, stability);
                assert!(d >= cfg.min_lock_seconds && d <= cfg.max_lock_seconds);
                prev = d;
            }
        }
    }
}
