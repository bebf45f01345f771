/*
[INPUT]:  Test scenarios needing a controllable WebSocket peer
[OUTPUT]: Scripted connector, in-memory peers, event helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use binance_stream_adapter::error::{BinanceError, Result};
use binance_stream_adapter::ws::{Connector, SessionConfig, SessionEvent, WsReader, WsWriter};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Session config with short backoff so scenarios finish in little virtual time
pub fn fast_config(max_reconnect_attempts: u32) -> SessionConfig {
    SessionConfig {
        max_reconnect_attempts,
        base_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(10),
        ..SessionConfig::new("ws://mock.test/ws")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Fail,
}

/// Server side of one accepted mock connection.
///
/// Dropping it ends the client's read stream, which the session sees as an
/// abnormal disconnect.
pub struct MockPeer {
    pub inbound: mpsc::UnboundedSender<Result<WsMessage>>,
    pub outbound: mpsc::UnboundedReceiver<WsMessage>,
}

impl MockPeer {
    pub fn push_text(&self, text: &str) {
        self.inbound
            .send(Ok(WsMessage::Text(text.to_string().into())))
            .expect("session reader alive");
    }

    pub fn push(&self, message: WsMessage) {
        self.inbound.send(Ok(message)).expect("session reader alive");
    }

    /// Next outbound frame that is not a heartbeat ping
    pub async fn next_non_ping(&mut self) -> Option<WsMessage> {
        while let Some(message) = self.outbound.recv().await {
            if !matches!(message, WsMessage::Ping(_)) {
                return Some(message);
            }
        }
        None
    }

    /// Next outbound text frame, skipping control frames
    pub async fn next_text(&mut self) -> Option<String> {
        while let Some(message) = self.outbound.recv().await {
            if let WsMessage::Text(text) = message {
                return Some(text.as_str().to_string());
            }
        }
        None
    }

    /// Everything already written to this peer
    pub fn drain(&mut self) -> Vec<WsMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Connector that follows a script of accept/fail outcomes, then fails forever
pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub fn new(
        script: impl IntoIterator<Item = Outcome>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: AtomicUsize::new(0),
            peers,
        });
        (connector, peer_rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<(WsWriter, WsReader)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Fail);
        if outcome == Outcome::Fail {
            return Err(BinanceError::WebSocket("connection refused".to_string()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<WsMessage>>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = futures_util::sink::unfold(
            outbound_tx,
            |tx: mpsc::UnboundedSender<WsMessage>, message: WsMessage| async move {
                tx.send(message)
                    .map_err(|_| BinanceError::WebSocket("peer gone".to_string()))?;
                Ok::<_, BinanceError>(tx)
            },
        );
        let reader = futures_util::stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let _ = self.peers.send(MockPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });
        Ok((Box::pin(writer), Box::pin(reader)))
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    rx.recv().await.expect("event channel open")
}

/// Decoded control frame: (method, params, id)
pub fn parse_control(text: &str) -> (String, BTreeSet<String>, u64) {
    let value: serde_json::Value = serde_json::from_str(text).expect("control frame is json");
    let method = value["method"].as_str().expect("method").to_string();
    let params = value["params"]
        .as_array()
        .expect("params")
        .iter()
        .map(|p| p.as_str().expect("string param").to_string())
        .collect();
    let id = value["id"].as_u64().expect("numeric id");
    (method, params, id)
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
