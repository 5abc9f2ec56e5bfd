// =============================================================================
// Driver Module
// =============================================================================
//
// Everything that runs the gate over time:
// - Snapshot sources (trait + JSON-lines replay)
// - Signal sinks (trait + broadcast fan-out)
// - Outcome feedback loop (single writer over mpsc)
// - Polling scheduler with graceful shutdown

pub mod feedback;
pub mod scheduler;
pub mod sink;
pub mod source;

pub use feedback::{OutcomeReport, OUTCOME_CHANNEL_CAPACITY};
pub use scheduler::{Scheduler, TickReport};
pub use sink::{log_signals, BroadcastSink, SignalSink};
pub use source::{ReplaySource, SnapshotSource};
