//! Per-turn latency measurement.
//!
//! - [`TurnTracker`] is the per-session state machine fed by the relay.
//! - [`LatencyEvent`] is the structured record it produces.
//! - [`LatencySink`] receives records; [`LatencyLog`] persists them.

mod event;
mod sink;
mod tracker;

pub use event::{FieldValue, LatencyEvent, LatencyEventKind};
pub use sink::{LatencyLog, LatencySink, MemorySink};
pub use tracker::{TEXT_PREVIEW_CHARS, TurnSnapshot, TurnTracker};
