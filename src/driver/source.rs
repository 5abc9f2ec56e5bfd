// =============================================================================
// Snapshot Sources — where per-asset MarketState snapshots come from
// =============================================================================
//
// Indicator values are computed upstream; the driver only asks a source for
// the next snapshot of an asset on every tick.  `ReplaySource` feeds
// recorded snapshots from a JSON-lines file, one `MarketState` per line, and
// hands them out per asset in file order.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::types::MarketState;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// The next snapshot for `asset_id`, or `None` when nothing new is
    /// available this tick.
    async fn next_snapshot(&self, asset_id: &str) -> Result<Option<MarketState>>;
}

/// Recorded snapshots replayed in order, per asset.
pub struct ReplaySource {
    queues: Mutex<HashMap<String, VecDeque<MarketState>>>,
}

impl ReplaySource {
    pub fn new(snapshots: impl IntoIterator<Item = MarketState>) -> Self {
        let mut queues: HashMap<String, VecDeque<MarketState>> = HashMap::new();
        for snapshot in snapshots {
            queues
                .entry(snapshot.asset_id.clone())
                .or_default()
                .push_back(snapshot);
        }
        Self {
            queues: Mutex::new(queues),
        }
    }

    /// Parse JSON-lines snapshots. Blank lines are skipped; a malformed line
    /// fails the whole load with its line number.
    pub fn from_jsonl(content: &str) -> Result<Self> {
        let mut snapshots = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let snapshot: MarketState = serde_json::from_str(line)
                .with_context(|| format!("invalid snapshot on line {}", idx + 1))?;
            snapshots.push(snapshot);
        }
        Ok(Self::new(snapshots))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let source = Self::from_jsonl(&content)
            .with_context(|| format!("failed to parse replay file {}", path.display()))?;
        info!(path = %path.display(), snapshots = source.remaining(), "replay source loaded");
        Ok(source)
    }

    /// Snapshots not yet handed out, across all assets.
    pub fn remaining(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl SnapshotSource for ReplaySource {
    async fn next_snapshot(&self, asset_id: &str) -> Result<Option<MarketState>> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(asset_id) else {
            return Ok(None);
        };
        let next = queue.pop_front();
        if queue.is_empty() {
            queues.remove(asset_id);
            warn!(asset = %asset_id, "replay exhausted for asset");
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = r#"
{"asset_id":"BTCUSDT","price":100.0,"rsi":25.0,"macd":0.4,"atr":1.0,"timestamp":1.0}
{"asset_id":"ETHUSDT","price":50.0,"rsi":null,"timestamp":1.0}

{"asset_id":"BTCUSDT","price":101.0,"rsi":28.0,"timestamp":2.0}
"#;

    #[tokio::test]
    async fn replays_per_asset_in_order() {
        let source = ReplaySource::from_jsonl(LINES).unwrap();
        assert_eq!(source.remaining(), 3);

        let first = source.next_snapshot("BTCUSDT").await.unwrap().unwrap();
        let second = source.next_snapshot("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(first.price, 100.0);
        assert_eq!(second.price, 101.0);
        assert!(source.next_snapshot("BTCUSDT").await.unwrap().is_none());

        let eth = source.next_snapshot("ETHUSDT").await.unwrap().unwrap();
        assert!(eth.rsi.is_nan());
        assert!(source.next_snapshot("SOLUSDT").await.unwrap().is_none());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = ReplaySource::from_jsonl("{\"asset_id\":\"A\"}\nnot json\n")
            .err()
            .expect("parse error");
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ReplaySource::load("/nonexistent/replay.jsonl").is_err());
    }
}
