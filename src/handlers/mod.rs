//! HTTP and WebSocket request handlers
//!
//! - `api` - health check, latency stats and session introspection
//! - `realtime` - browser WebSocket relayed to the upstream realtime API

pub mod api;
pub mod realtime;

pub use realtime::realtime_handler;
