// =============================================================================
// Signal Sinks — fan-out of emitted signals
// =============================================================================

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::signals::Signal;

/// Receives every emitted signal. Delivery must not block the driver.
pub trait SignalSink: Send + Sync {
    fn publish(&self, signal: &Signal);
}

/// Broadcasts signals to any number of subscribers. Slow subscribers lag and
/// lose the oldest signals rather than stalling the gate.
pub struct BroadcastSink {
    sender: broadcast::Sender<Signal>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }
}

impl SignalSink for BroadcastSink {
    fn publish(&self, signal: &Signal) {
        match self.sender.send(signal.clone()) {
            Ok(receivers) => debug!(asset = %signal.asset_id, receivers, "signal broadcast"),
            Err(_) => debug!(asset = %signal.asset_id, "signal broadcast with no subscribers"),
        }
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Log every signal from `signals` as JSON until the channel closes. Signals
/// still buffered when the last sender drops are logged before returning.
/// Returns how many were logged.
pub async fn log_signals(mut signals: broadcast::Receiver<Signal>) -> usize {
    let mut logged = 0usize;
    loop {
        match signals.recv().await {
            Ok(signal) => match serde_json::to_string(&signal) {
                Ok(json) => {
                    info!(asset = %signal.asset_id, signal = %json, "signal");
                    logged += 1;
                }
                Err(e) => error!(error = %e, "failed to serialise signal"),
            },
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                warn!(dropped, "signal logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalType;

    fn signal(asset: &str) -> Signal {
        Signal {
            id: "sig-1".into(),
            asset_id: asset.into(),
            signal_type: SignalType::Buy,
            entry_price: 100.0,
            stop_loss: 98.5,
            take_profit: 103.75,
            confidence: 80.0,
            risk_reward_ratio: 2.5,
            volatility_score: 0.01,
            reasoning: "test".into(),
            locked_until: 700.0,
            created_at: "2026-01-01T00:00:00Z".into(),
            trend_stability: 0.8,
            market_stability: 0.7,
            trend_clarity: 0.7,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_signals() {
        let sink = BroadcastSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        sink.publish(&signal("BTCUSDT"));
        assert_eq!(a.recv().await.unwrap().asset_id, "BTCUSDT");
        assert_eq!(b.recv().await.unwrap().asset_id, "BTCUSDT");
    }

    #[tokio::test]
    async fn logger_drains_buffered_signals_after_sink_drops() {
        let sink = BroadcastSink::new(8);
        let logger = tokio::spawn(log_signals(sink.subscribe()));
        sink.publish(&signal("BTCUSDT"));
        sink.publish(&signal("ETHUSDT"));
        drop(sink);
        assert_eq!(logger.await.unwrap(), 2);
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        BroadcastSink::default().publish(&signal("ETHUSDT"));
    }
}
