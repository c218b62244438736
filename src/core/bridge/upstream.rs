//! Upstream bridge to the realtime speech API.
//!
//! The upstream endpoint authenticates with a pre-shared key sent in the
//! `api-key` header and requires two WebSocket sub-protocols to be offered
//! during the handshake. Connections are opened once per session and never
//! re-established.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;
use zeroize::Zeroize;

use super::{
    BridgeError, BridgeResult, RelayMessage, UpstreamBridge, UpstreamConnector, UpstreamReceiver,
    UpstreamSender,
};

/// Header carrying the upstream credential.
pub const API_KEY_HEADER: &str = "api-key";

/// Sub-protocols offered during the upstream handshake.
pub const REALTIME_SUBPROTOCOLS: [&str; 2] = ["realtime", "openai-beta.realtime-v1"];

/// Default time allowed for the upstream handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for the upstream endpoint.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Full `ws://` or `wss://` endpoint URL, including query parameters
    pub url: String,
    /// Pre-shared API key
    pub api_key: String,
    /// Handshake timeout
    pub connect_timeout: Duration,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for UpstreamConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

/// Connector for the realtime speech API.
#[derive(Debug, Clone)]
pub struct RealtimeUpstream {
    config: UpstreamConfig,
}

impl RealtimeUpstream {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Build the upgrade request with credential and sub-protocol headers.
    fn build_request(&self) -> BridgeResult<http::Request<()>> {
        if self.config.api_key.is_empty() {
            return Err(BridgeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let url = Url::parse(&self.config.url)
            .map_err(|e| BridgeError::InvalidConfiguration(format!("invalid upstream URL: {e}")))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(BridgeError::InvalidConfiguration(format!(
                "unsupported upstream URL scheme: {}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| BridgeError::InvalidConfiguration("upstream URL has no host".to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        http::Request::builder()
            .uri(url.as_str())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .header("Sec-WebSocket-Protocol", REALTIME_SUBPROTOCOLS.join(", "))
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| BridgeError::InvalidConfiguration(e.to_string()))
    }
}

#[async_trait]
impl UpstreamConnector for RealtimeUpstream {
    async fn connect(&self) -> BridgeResult<UpstreamBridge> {
        let request = self.build_request()?;

        tracing::info!(url = %self.config.url, "Connecting to upstream realtime API");

        let (ws_stream, response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| BridgeError::Timeout(self.config.connect_timeout))?
        .map_err(BridgeError::from_handshake)?;

        let protocol = response
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        tracing::debug!(protocol, "Upstream handshake complete");

        let (sink, stream) = ws_stream.split();
        Ok(UpstreamBridge {
            sender: Box::new(TungsteniteSender { sink, closed: false }),
            receiver: Box::new(TungsteniteReceiver { stream }),
        })
    }
}

fn into_tungstenite_message(message: RelayMessage) -> Message {
    match message {
        RelayMessage::Text(text) => Message::Text(text.into()),
        RelayMessage::Binary(data) => Message::Binary(data),
    }
}

/// Sending half of an upstream WebSocket.
pub struct TungsteniteSender {
    sink: SplitSink<UpstreamStream, Message>,
    closed: bool,
}

#[async_trait]
impl UpstreamSender for TungsteniteSender {
    async fn send(&mut self, message: RelayMessage) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::Closed);
        }
        self.sink
            .send(into_tungstenite_message(message))
            .await
            .map_err(BridgeError::from)
    }

    async fn close(&mut self) -> BridgeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(e) => match BridgeError::from(e) {
                BridgeError::Closed => Ok(()),
                other => {
                    tracing::debug!("Upstream close did not complete cleanly: {}", other);
                    Ok(())
                }
            },
        }
    }
}

/// Receiving half of an upstream WebSocket.
pub struct TungsteniteReceiver {
    stream: SplitStream<UpstreamStream>,
}

#[async_trait]
impl UpstreamReceiver for TungsteniteReceiver {
    async fn recv(&mut self) -> BridgeResult<Option<RelayMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(RelayMessage::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(RelayMessage::Binary(data))),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Upstream closed the connection");
                    return Ok(None);
                }
                // Pings are answered by tungstenite on the next write
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    return match BridgeError::from(e) {
                        BridgeError::Closed => Ok(None),
                        other => Err(other),
                    };
                }
                None => return Ok(None),
            }
        }
    }
}
