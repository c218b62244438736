//! Duplex connection bridges.
//!
//! A session owns exactly two connections: the inbound one from the browser
//! (the client bridge) and the outbound one to the speech API (the upstream
//! bridge). Each bridge is split into a sending and a receiving half so the
//! relay can drive both directions from independent tasks without sharing a
//! handle.
//!
//! The traits here are the seam between the relay and the transports:
//! [`client`] implements the client side over axum's WebSocket and
//! [`upstream`] implements the upstream side over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub mod client;
mod error;
pub mod upstream;

pub use client::WebSocketClient;
pub use error::{BridgeError, BridgeResult};
pub use upstream::{
    API_KEY_HEADER, REALTIME_SUBPROTOCOLS, RealtimeUpstream, UpstreamConfig,
};

/// An opaque payload relayed between the two connections.
///
/// The relay never alters content; it only inspects text payloads on the
/// upstream-to-client direction to extract metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Text(String),
    Binary(Bytes),
}

impl RelayMessage {
    /// Text payload, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of polling the client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPoll {
    /// A message arrived within the poll window
    Message(RelayMessage),
    /// Nothing arrived yet; the connection is still open
    Empty,
    /// The client closed the connection
    Closed,
}

/// Receiving half of the client connection.
#[async_trait]
pub trait ClientReceiver: Send {
    /// Wait at most `timeout` for the next client message.
    ///
    /// Returns [`ClientPoll::Empty`] when the window elapses without a
    /// message, which callers must treat as "poll again", not as a failure.
    async fn poll(&mut self, timeout: Duration) -> BridgeResult<ClientPoll>;
}

/// Sending half of the client connection.
#[async_trait]
pub trait ClientSender: Send {
    async fn send(&mut self, message: RelayMessage) -> BridgeResult<()>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> BridgeResult<()>;
}

/// Sending half of the upstream connection.
#[async_trait]
pub trait UpstreamSender: Send {
    async fn send(&mut self, message: RelayMessage) -> BridgeResult<()>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> BridgeResult<()>;
}

/// Receiving half of the upstream connection.
#[async_trait]
pub trait UpstreamReceiver: Send {
    /// Next upstream message, or `None` at end of stream.
    async fn recv(&mut self) -> BridgeResult<Option<RelayMessage>>;
}

/// Opens upstream connections, one per session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open and authenticate a new upstream connection.
    ///
    /// Failures are final for the session; callers never retry.
    async fn connect(&self) -> BridgeResult<UpstreamBridge>;
}

/// Both halves of an established client connection.
pub struct ClientBridge {
    pub sender: Box<dyn ClientSender>,
    pub receiver: Box<dyn ClientReceiver>,
}

/// Both halves of an established upstream connection.
pub struct UpstreamBridge {
    pub sender: Box<dyn UpstreamSender>,
    pub receiver: Box<dyn UpstreamReceiver>,
}
