//! Per-session relay between a browser and the upstream speech API.
//!
//! A session runs two forwarding tasks:
//!
//! - client to upstream: polls the client with a short timeout and forwards
//!   every message verbatim. It never touches the tracker.
//! - upstream to client: forwards every upstream message verbatim and feeds
//!   decodable events to the session's [`TurnTracker`].
//!
//! Both tasks share one cancellation token and cancel it when they exit, so
//! the first loop to finish tears down the other. Teardown then closes both
//! connections, records the disconnect and deregisters the session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{UpstreamEvent, connect_error_message};
use super::registry::{SessionRegistry, SharedTracker, generate_session_id};
use crate::core::bridge::{
    ClientBridge, ClientPoll, ClientReceiver, ClientSender, UpstreamBridge, UpstreamConnector,
    UpstreamReceiver, UpstreamSender,
};
use crate::core::latency::{LatencySink, TurnTracker};

/// Default client poll window.
pub const DEFAULT_CLIENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Default pause after an empty client poll.
pub const DEFAULT_CLIENT_IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Timing knobs for the client to upstream loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub client_poll_timeout: Duration,
    pub client_idle_backoff: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            client_poll_timeout: DEFAULT_CLIENT_POLL_TIMEOUT,
            client_idle_backoff: DEFAULT_CLIENT_IDLE_BACKOFF,
        }
    }
}

/// Why a forwarding loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    ClientClosed,
    ClientError,
    ClientSendFailed,
    UpstreamClosed,
    UpstreamError,
    Cancelled,
    /// The loop task panicked or was aborted
    Aborted,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: String,
    pub upstream_connected: bool,
    pub client_to_upstream: Option<LoopExit>,
    pub upstream_to_client: Option<LoopExit>,
}

/// Runs relay sessions and owns the shared per-process collaborators.
#[derive(Clone)]
pub struct RelayCoordinator {
    registry: SessionRegistry,
    sink: Arc<dyn LatencySink>,
    settings: RelaySettings,
}

impl RelayCoordinator {
    pub fn new(registry: SessionRegistry, sink: Arc<dyn LatencySink>, settings: RelaySettings) -> Self {
        Self {
            registry,
            sink,
            settings,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings
    }

    /// Run one session until either side disconnects.
    pub async fn run<C>(&self, client: ClientBridge, connector: &C) -> SessionOutcome
    where
        C: UpstreamConnector + ?Sized,
    {
        let session_id = generate_session_id();
        let tracker: SharedTracker = Arc::new(Mutex::new(TurnTracker::new(
            session_id.clone(),
            Arc::clone(&self.sink),
        )));

        let registration = match self.registry.register(Arc::clone(&tracker)) {
            Ok(registration) => Some(registration),
            Err(e) => {
                warn!(session_id = %session_id, "Session not visible to introspection: {}", e);
                None
            }
        };

        info!(session_id = %session_id, "Client connected");
        tracker.lock().on_connection_start();

        let ClientBridge {
            sender: mut client_tx,
            receiver: client_rx,
        } = client;

        let outcome = match connector.connect().await {
            Ok(upstream) => {
                tracker.lock().on_connection_established();
                info!(session_id = %session_id, "Upstream connected");
                self.relay(&session_id, client_tx, client_rx, upstream, &tracker)
                    .await
            }
            Err(e) => {
                error!(session_id = %session_id, "Upstream connection failed: {}", e);
                let message = e.to_string();
                tracker.lock().on_error(&message);

                if let Err(send_err) = client_tx.send(connect_error_message(&message)).await {
                    debug!(session_id = %session_id, "Could not report connect failure to client: {}", send_err);
                }
                if let Err(close_err) = client_tx.close().await {
                    debug!(session_id = %session_id, "Client close failed: {}", close_err);
                }

                SessionOutcome {
                    session_id: session_id.clone(),
                    upstream_connected: false,
                    client_to_upstream: None,
                    upstream_to_client: None,
                }
            }
        };

        tracker.lock().on_disconnect();
        if let Some(registration) = registration {
            registration.release();
        }
        info!(session_id = %session_id, "Client disconnected");

        outcome
    }

    async fn relay(
        &self,
        session_id: &str,
        client_tx: Box<dyn ClientSender>,
        client_rx: Box<dyn ClientReceiver>,
        upstream: UpstreamBridge,
        tracker: &SharedTracker,
    ) -> SessionOutcome {
        let UpstreamBridge {
            sender: upstream_tx,
            receiver: upstream_rx,
        } = upstream;
        let cancel = CancellationToken::new();

        let inbound = tokio::spawn(forward_client_to_upstream(
            session_id.to_string(),
            client_rx,
            upstream_tx,
            cancel.clone(),
            self.settings,
        ));
        let outbound = tokio::spawn(forward_upstream_to_client(
            session_id.to_string(),
            upstream_rx,
            client_tx,
            Arc::clone(tracker),
            cancel.clone(),
        ));

        let (inbound, outbound) = tokio::join!(inbound, outbound);

        let client_to_upstream = match inbound {
            Ok((exit, mut upstream_tx)) => {
                if let Err(e) = upstream_tx.close().await {
                    debug!(session_id = %session_id, "Upstream close failed: {}", e);
                }
                exit
            }
            Err(e) => {
                error!(session_id = %session_id, "Client forwarding task failed: {}", e);
                LoopExit::Aborted
            }
        };

        let upstream_to_client = match outbound {
            Ok((exit, mut client_tx)) => {
                if let Err(e) = client_tx.close().await {
                    debug!(session_id = %session_id, "Client close failed: {}", e);
                }
                exit
            }
            Err(e) => {
                error!(session_id = %session_id, "Upstream forwarding task failed: {}", e);
                LoopExit::Aborted
            }
        };

        debug!(
            session_id = %session_id,
            ?client_to_upstream,
            ?upstream_to_client,
            "Relay loops finished"
        );

        SessionOutcome {
            session_id: session_id.to_string(),
            upstream_connected: true,
            client_to_upstream: Some(client_to_upstream),
            upstream_to_client: Some(upstream_to_client),
        }
    }
}

async fn forward_client_to_upstream(
    session_id: String,
    mut client_rx: Box<dyn ClientReceiver>,
    mut upstream_tx: Box<dyn UpstreamSender>,
    cancel: CancellationToken,
    settings: RelaySettings,
) -> (LoopExit, Box<dyn UpstreamSender>) {
    // Cancels the sibling loop however this one ends, including panics
    let _cancel_on_exit = cancel.clone().drop_guard();

    let exit = loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break LoopExit::Cancelled,
            polled = client_rx.poll(settings.client_poll_timeout) => polled,
        };

        match polled {
            Ok(ClientPoll::Message(message)) => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break LoopExit::Cancelled,
                    sent = upstream_tx.send(message) => sent,
                };
                // Outbound failures are per-message; the session ends when a reader sees it
                if let Err(e) = sent {
                    warn!(session_id = %session_id, "Failed to forward client message upstream: {}", e);
                }
            }
            Ok(ClientPoll::Empty) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break LoopExit::Cancelled,
                    _ = tokio::time::sleep(settings.client_idle_backoff) => {}
                }
            }
            Ok(ClientPoll::Closed) => {
                info!(session_id = %session_id, "Client closed the connection");
                break LoopExit::ClientClosed;
            }
            Err(e) => {
                warn!(session_id = %session_id, "Client receive failed: {}", e);
                break LoopExit::ClientError;
            }
        }
    };

    (exit, upstream_tx)
}

async fn forward_upstream_to_client(
    session_id: String,
    mut upstream_rx: Box<dyn UpstreamReceiver>,
    mut client_tx: Box<dyn ClientSender>,
    tracker: SharedTracker,
    cancel: CancellationToken,
) -> (LoopExit, Box<dyn ClientSender>) {
    let _cancel_on_exit = cancel.clone().drop_guard();

    let exit = loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break LoopExit::Cancelled,
            received = upstream_rx.recv() => received,
        };

        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!(session_id = %session_id, "Upstream stream ended");
                break LoopExit::UpstreamClosed;
            }
            Err(e) if e.is_closed() => {
                info!(session_id = %session_id, "Upstream connection closed");
                break LoopExit::UpstreamClosed;
            }
            Err(e) => {
                warn!(session_id = %session_id, "Upstream receive failed: {}", e);
                break LoopExit::UpstreamError;
            }
        };

        match UpstreamEvent::decode(&message) {
            Some(event) => {
                debug!(session_id = %session_id, event = event.name(), "Upstream event");
                event.apply(&mut tracker.lock());
            }
            None => debug!(session_id = %session_id, "Forwarding undecoded upstream message"),
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break LoopExit::Cancelled,
            sent = client_tx.send(message) => sent,
        };
        if let Err(e) = sent {
            if e.is_closed() {
                debug!(session_id = %session_id, "Client gone before upstream message was delivered");
            } else {
                warn!(session_id = %session_id, "Failed to forward upstream message to client: {}", e);
            }
            break LoopExit::ClientSendFailed;
        }
    };

    (exit, client_tx)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::core::bridge::{BridgeError, BridgeResult, RelayMessage};
    use crate::core::latency::{LatencyEventKind, MemorySink};

    /// Items a test feeds to the client receiver.
    enum ClientInput {
        Message(RelayMessage),
        Fail,
    }

    struct ChannelClientReceiver {
        rx: mpsc::UnboundedReceiver<ClientInput>,
    }

    #[async_trait]
    impl ClientReceiver for ChannelClientReceiver {
        async fn poll(&mut self, timeout: Duration) -> BridgeResult<ClientPoll> {
            match tokio::time::timeout(timeout, self.rx.recv()).await {
                Err(_) => Ok(ClientPoll::Empty),
                Ok(None) => Ok(ClientPoll::Closed),
                Ok(Some(ClientInput::Message(message))) => Ok(ClientPoll::Message(message)),
                Ok(Some(ClientInput::Fail)) => {
                    Err(BridgeError::WebSocketError("client reset".to_string()))
                }
            }
        }
    }

    struct ChannelSender {
        tx: mpsc::UnboundedSender<RelayMessage>,
        closes: Arc<AtomicUsize>,
        fail_sends: bool,
    }

    impl ChannelSender {
        fn deliver(&mut self, message: RelayMessage) -> BridgeResult<()> {
            if self.fail_sends {
                return Err(BridgeError::Closed);
            }
            self.tx.send(message).map_err(|_| BridgeError::Closed)
        }
    }

    #[async_trait]
    impl ClientSender for ChannelSender {
        async fn send(&mut self, message: RelayMessage) -> BridgeResult<()> {
            self.deliver(message)
        }

        async fn close(&mut self) -> BridgeResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl UpstreamSender for ChannelSender {
        async fn send(&mut self, message: RelayMessage) -> BridgeResult<()> {
            self.deliver(message)
        }

        async fn close(&mut self) -> BridgeResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ChannelUpstreamReceiver {
        rx: mpsc::UnboundedReceiver<RelayMessage>,
    }

    #[async_trait]
    impl UpstreamReceiver for ChannelUpstreamReceiver {
        async fn recv(&mut self) -> BridgeResult<Option<RelayMessage>> {
            Ok(self.rx.recv().await)
        }
    }

    /// Upstream receiver that fails once, then reports end of stream.
    struct ErrorUpstreamReceiver {
        error: Option<BridgeError>,
    }

    #[async_trait]
    impl UpstreamReceiver for ErrorUpstreamReceiver {
        async fn recv(&mut self) -> BridgeResult<Option<RelayMessage>> {
            match self.error.take() {
                Some(error) => Err(error),
                None => Ok(None),
            }
        }
    }

    fn failing_upstream(error: BridgeError) -> MockConnector {
        let (sent_tx, _received) = mpsc::unbounded_channel();
        MockConnector {
            bridge: Mutex::new(Some(UpstreamBridge {
                sender: Box::new(ChannelSender {
                    tx: sent_tx,
                    closes: Arc::new(AtomicUsize::new(0)),
                    fail_sends: false,
                }),
                receiver: Box::new(ErrorUpstreamReceiver { error: Some(error) }),
            })),
        }
    }

    /// Test side of a client connection.
    struct ClientPeer {
        input: mpsc::UnboundedSender<ClientInput>,
        received: mpsc::UnboundedReceiver<RelayMessage>,
        closes: Arc<AtomicUsize>,
    }

    fn client_pair(fail_sends: bool) -> (ClientBridge, ClientPeer) {
        let (input, input_rx) = mpsc::unbounded_channel();
        let (output_tx, received) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));

        let bridge = ClientBridge {
            sender: Box::new(ChannelSender {
                tx: output_tx,
                closes: Arc::clone(&closes),
                fail_sends,
            }),
            receiver: Box::new(ChannelClientReceiver { rx: input_rx }),
        };
        (
            bridge,
            ClientPeer {
                input,
                received,
                closes,
            },
        )
    }

    /// Test side of an upstream connection.
    struct UpstreamPeer {
        output: mpsc::UnboundedSender<RelayMessage>,
        received: mpsc::UnboundedReceiver<RelayMessage>,
        closes: Arc<AtomicUsize>,
    }

    /// Connector handing out one prepared upstream connection.
    struct MockConnector {
        bridge: Mutex<Option<UpstreamBridge>>,
    }

    #[async_trait]
    impl UpstreamConnector for MockConnector {
        async fn connect(&self) -> BridgeResult<UpstreamBridge> {
            self.bridge
                .lock()
                .take()
                .ok_or_else(|| BridgeError::ConnectionFailed("already used".to_string()))
        }
    }

    fn upstream_pair() -> (MockConnector, UpstreamPeer) {
        let (output, output_rx) = mpsc::unbounded_channel();
        let (sent_tx, received) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));

        let bridge = UpstreamBridge {
            sender: Box::new(ChannelSender {
                tx: sent_tx,
                closes: Arc::clone(&closes),
                fail_sends: false,
            }),
            receiver: Box::new(ChannelUpstreamReceiver { rx: output_rx }),
        };
        (
            MockConnector {
                bridge: Mutex::new(Some(bridge)),
            },
            UpstreamPeer {
                output,
                received,
                closes,
            },
        )
    }

    struct FailingConnector;

    #[async_trait]
    impl UpstreamConnector for FailingConnector {
        async fn connect(&self) -> BridgeResult<UpstreamBridge> {
            Err(BridgeError::AuthenticationFailed(
                "upstream returned 401 Unauthorized".to_string(),
            ))
        }
    }

    fn coordinator() -> (RelayCoordinator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let settings = RelaySettings {
            client_poll_timeout: Duration::from_millis(20),
            client_idle_backoff: Duration::from_millis(1),
        };
        (
            RelayCoordinator::new(SessionRegistry::new(), sink.clone(), settings),
            sink,
        )
    }

    fn text(value: &str) -> RelayMessage {
        RelayMessage::Text(value.to_string())
    }

    #[tokio::test]
    async fn test_forwards_both_directions_verbatim() {
        let (coordinator, sink) = coordinator();
        let (client, mut client_peer) = client_pair(false);
        let (connector, mut upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        let client_messages = vec![
            text(r#"{"type":"input_audio_buffer.append","audio":"AAAA"}"#),
            text("not json at all"),
            RelayMessage::Binary(Bytes::from_static(&[0, 159, 146, 150])),
        ];
        for message in &client_messages {
            client_peer
                .input
                .send(ClientInput::Message(message.clone()))
                .unwrap();
        }
        for expected in &client_messages {
            assert_eq!(upstream_peer.received.recv().await.as_ref(), Some(expected));
        }

        let upstream_messages = vec![
            text(r#"{"type":"session.created","session":{"id":"s1"}}"#),
            text(r#"{"type":"response.output_audio.delta","delta":"UklGRg=="}"#),
            text("{broken"),
            RelayMessage::Binary(Bytes::from_static(b"\x01\x02")),
        ];
        for message in &upstream_messages {
            upstream_peer.output.send(message.clone()).unwrap();
        }
        for expected in &upstream_messages {
            assert_eq!(client_peer.received.recv().await.as_ref(), Some(expected));
        }

        // Upstream hangs up
        drop(upstream_peer.output);
        let outcome = session.await.unwrap();

        assert!(outcome.upstream_connected);
        assert_eq!(outcome.upstream_to_client, Some(LoopExit::UpstreamClosed));
        assert_eq!(outcome.client_to_upstream, Some(LoopExit::Cancelled));
        assert_eq!(sink.events_of(LatencyEventKind::FirstAudio).len(), 1);
        assert_eq!(upstream_peer.closes.load(Ordering::SeqCst), 1);
        assert_eq!(client_peer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_upstream_message_fires_no_tracker_event() {
        let (coordinator, sink) = coordinator();
        let (client, mut client_peer) = client_pair(false);
        let (connector, upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        upstream_peer.output.send(text(r#"{"delta":"AAAA"}"#)).unwrap();
        assert_eq!(
            client_peer.received.recv().await,
            Some(text(r#"{"delta":"AAAA"}"#))
        );

        drop(upstream_peer.output);
        session.await.unwrap();

        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                LatencyEventKind::ConnectionStart,
                LatencyEventKind::ConnectionEstablished,
                LatencyEventKind::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_events_drive_tracker() {
        let (coordinator, sink) = coordinator();
        let (client, mut client_peer) = client_pair(false);
        let (connector, upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        let events = [
            r#"{"type":"input_audio_buffer.speech_started"}"#,
            r#"{"type":"input_audio_buffer.speech_stopped"}"#,
            r#"{"type":"response.created"}"#,
            r#"{"type":"response.output_audio.delta","delta":"AAAAAAAA"}"#,
            r#"{"type":"response.output_audio.delta","delta":"AAAA"}"#,
            r#"{"type":"response.output_audio_transcript.delta","delta":"Hello"}"#,
            r#"{"type":"error","error":{"message":"rate limited"}}"#,
            r#"{"type":"response.done"}"#,
        ];
        for event in events {
            upstream_peer.output.send(text(event)).unwrap();
        }
        for event in events {
            assert_eq!(client_peer.received.recv().await, Some(text(event)));
        }

        drop(upstream_peer.output);
        session.await.unwrap();

        let done = sink.events_of(LatencyEventKind::ResponseDone);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].count("audio_chunks"), Some(2));
        assert_eq!(done[0].count("audio_bytes"), Some(12));
        assert_eq!(sink.events_of(LatencyEventKind::FirstText).len(), 1);

        let errors = sink.events_of(LatencyEventKind::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text("message"), Some("rate limited"));

        let disconnected = sink.events_of(LatencyEventKind::Disconnected);
        assert_eq!(disconnected[0].count("total_requests"), Some(1));
    }

    #[tokio::test]
    async fn test_client_error_cancels_upstream_loop() {
        let (coordinator, sink) = coordinator();
        let registry = coordinator.registry().clone();
        let (client, client_peer) = client_pair(false);
        let (connector, upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        // Wait until the session is live
        while registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        client_peer.input.send(ClientInput::Fail).unwrap();
        let outcome = session.await.unwrap();

        assert_eq!(outcome.client_to_upstream, Some(LoopExit::ClientError));
        assert_eq!(outcome.upstream_to_client, Some(LoopExit::Cancelled));
        assert_eq!(sink.events_of(LatencyEventKind::Disconnected).len(), 1);
        assert!(registry.is_empty());
        assert!(!registry.contains(&outcome.session_id));
        assert_eq!(upstream_peer.closes.load(Ordering::SeqCst), 1);
        assert_eq!(client_peer.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_send_failure_ends_session() {
        let (coordinator, sink) = coordinator();
        let (client, _client_peer) = client_pair(true);
        let (connector, upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        upstream_peer
            .output
            .send(text(r#"{"type":"response.created"}"#))
            .unwrap();
        let outcome = session.await.unwrap();

        assert_eq!(outcome.upstream_to_client, Some(LoopExit::ClientSendFailed));
        assert_eq!(outcome.client_to_upstream, Some(LoopExit::Cancelled));
        assert_eq!(sink.events_of(LatencyEventKind::ResponseCreated).len(), 1);
        assert_eq!(sink.events_of(LatencyEventKind::Disconnected).len(), 1);
    }

    #[tokio::test]
    async fn test_client_close_ends_session() {
        let (coordinator, _sink) = coordinator();
        let (client, client_peer) = client_pair(false);
        let (connector, _upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        drop(client_peer.input);
        let outcome = session.await.unwrap();

        assert_eq!(outcome.client_to_upstream, Some(LoopExit::ClientClosed));
        assert_eq!(outcome.upstream_to_client, Some(LoopExit::Cancelled));
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error_to_client() {
        let (coordinator, sink) = coordinator();
        let (client, mut client_peer) = client_pair(false);

        let outcome = coordinator.run(client, &FailingConnector).await;

        assert!(!outcome.upstream_connected);
        assert_eq!(outcome.client_to_upstream, None);

        let message = client_peer.received.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(message.as_text().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(
            value["error"]["message"],
            "Authentication failed: upstream returned 401 Unauthorized"
        );
        // Exactly one message before close
        assert!(client_peer.received.try_recv().is_err());
        assert_eq!(client_peer.closes.load(Ordering::SeqCst), 1);

        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                LatencyEventKind::ConnectionStart,
                LatencyEventKind::Error,
                LatencyEventKind::Disconnected,
            ]
        );
        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_session_registered_while_running() {
        let (coordinator, _sink) = coordinator();
        let registry = coordinator.registry().clone();
        let (client, _client_peer) = client_pair(false);
        let (connector, upstream_peer) = upstream_pair();

        let session = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(client, &connector).await })
        };

        while registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let snapshots = registry.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].session_id.starts_with("session_"));

        drop(upstream_peer.output);
        let outcome = session.await.unwrap();
        assert_eq!(outcome.session_id, snapshots[0].session_id);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_receive_errors_classified() {
        let (coordinator, sink) = coordinator();

        let (client, _client_peer) = client_pair(false);
        let outcome = coordinator
            .run(client, &failing_upstream(BridgeError::Closed))
            .await;
        assert_eq!(outcome.upstream_to_client, Some(LoopExit::UpstreamClosed));
        assert_eq!(outcome.client_to_upstream, Some(LoopExit::Cancelled));

        let (client, _client_peer) = client_pair(false);
        let outcome = coordinator
            .run(
                client,
                &failing_upstream(BridgeError::WebSocketError("reset".to_string())),
            )
            .await;
        assert_eq!(outcome.upstream_to_client, Some(LoopExit::UpstreamError));
        assert_eq!(outcome.client_to_upstream, Some(LoopExit::Cancelled));

        assert_eq!(sink.events_of(LatencyEventKind::Disconnected).len(), 2);
    }
}
