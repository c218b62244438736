use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the client and upstream bridges.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Upstream rejected the credential during the handshake
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Upstream answered the upgrade but the handshake could not complete
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Network-level connection failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Upstream did not complete the handshake in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Endpoint URL or credential header could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error on an established connection
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The connection is already closed
    #[error("Connection closed")]
    Closed,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Classify a failure raised while opening the upstream connection.
    pub fn from_handshake(error: tungstenite::Error) -> Self {
        use tungstenite::Error;

        match error {
            Error::Http(response) => {
                let status = response.status();
                if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN
                {
                    Self::AuthenticationFailed(format!("upstream returned {status}"))
                } else {
                    Self::HandshakeFailed(format!("upstream returned {status}"))
                }
            }
            Error::Protocol(e) => Self::HandshakeFailed(e.to_string()),
            Error::Url(e) => Self::InvalidConfiguration(e.to_string()),
            Error::HttpFormat(e) => Self::InvalidConfiguration(e.to_string()),
            Error::Io(e) => Self::ConnectionFailed(e.to_string()),
            Error::ConnectionClosed | Error::AlreadyClosed => Self::Closed,
            other => Self::ConnectionFailed(other.to_string()),
        }
    }

    /// Errors that mean the peer is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<tungstenite::Error> for BridgeError {
    fn from(error: tungstenite::Error) -> Self {
        use tungstenite::Error;

        match error {
            Error::ConnectionClosed | Error::AlreadyClosed => Self::Closed,
            other => Self::WebSocketError(other.to_string()),
        }
    }
}

impl From<axum::Error> for BridgeError {
    fn from(error: axum::Error) -> Self {
        Self::WebSocketError(error.to_string())
    }
}
