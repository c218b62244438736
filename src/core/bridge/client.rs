//! Client bridge over axum's WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use super::{BridgeError, BridgeResult, ClientBridge, ClientPoll, ClientReceiver, ClientSender, RelayMessage};

/// Splits an upgraded browser WebSocket into relay halves.
pub struct WebSocketClient;

impl WebSocketClient {
    pub fn split(socket: WebSocket) -> ClientBridge {
        let (sink, stream) = socket.split();
        ClientBridge {
            sender: Box::new(WebSocketClientSender { sink, closed: false }),
            receiver: Box::new(WebSocketClientReceiver {
                stream,
                closed: false,
            }),
        }
    }
}

fn into_ws_message(message: RelayMessage) -> Message {
    match message {
        RelayMessage::Text(text) => Message::Text(text.into()),
        RelayMessage::Binary(data) => Message::Binary(data),
    }
}

/// Receiving half of the browser connection.
pub struct WebSocketClientReceiver {
    stream: SplitStream<WebSocket>,
    closed: bool,
}

#[async_trait]
impl ClientReceiver for WebSocketClientReceiver {
    async fn poll(&mut self, timeout: Duration) -> BridgeResult<ClientPoll> {
        if self.closed {
            return Ok(ClientPoll::Closed);
        }

        let next = match tokio::time::timeout(timeout, self.stream.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(ClientPoll::Empty),
        };

        match next {
            Some(Ok(Message::Text(text))) => Ok(ClientPoll::Message(RelayMessage::Text(
                text.as_str().to_owned(),
            ))),
            Some(Ok(Message::Binary(data))) => Ok(ClientPoll::Message(RelayMessage::Binary(data))),
            // Control frames are answered by the transport
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(ClientPoll::Empty),
            Some(Ok(Message::Close(_))) | None => {
                self.closed = true;
                Ok(ClientPoll::Closed)
            }
            Some(Err(e)) => Err(BridgeError::from(e)),
        }
    }
}

/// Sending half of the browser connection.
pub struct WebSocketClientSender {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl ClientSender for WebSocketClientSender {
    async fn send(&mut self, message: RelayMessage) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::Closed);
        }
        self.sink
            .send(into_ws_message(message))
            .await
            .map_err(BridgeError::from)
    }

    async fn close(&mut self) -> BridgeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // The peer may already be gone; a failed close frame is not an error
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            tracing::debug!("Client close frame not delivered: {}", e);
        }
        if let Err(e) = self.sink.close().await {
            tracing::debug!("Client socket close failed: {}", e);
        }
        Ok(())
    }
}
