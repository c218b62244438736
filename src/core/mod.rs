pub mod bridge;
pub mod latency;
pub mod relay;

pub use bridge::{BridgeError, BridgeResult, RealtimeUpstream, UpstreamConfig, UpstreamConnector};
pub use latency::{LatencyLog, LatencySink, TurnTracker};
pub use relay::{RelayCoordinator, RelaySettings, SessionRegistry};
