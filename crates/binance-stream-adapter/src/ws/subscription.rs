/*
[INPUT]:  Stream identifiers requested by the caller, session lifecycle events
[OUTPUT]: SUBSCRIBE/UNSUBSCRIBE control frames, replay after every open
[POS]:    WebSocket layer - logical subscription set on top of ConnectionSession
[UPDATE]: When changing control message format or replay policy
*/

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BinanceError, Result};

use super::config::SessionConfig;
use super::session::{ConnectionSession, SessionEvent, SessionState};
use super::transport::{Connector, TungsteniteConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMethod {
    Subscribe,
    Unsubscribe,
}

/// `{"method": "SUBSCRIBE", "params": [...], "id": 1}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    pub method: ControlMethod,
    pub params: Vec<String>,
    pub id: u64,
}

impl ControlMessage {
    pub fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: ControlMethod::Subscribe,
            params,
            id,
        }
    }

    pub fn unsubscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: ControlMethod::Unsubscribe,
            params,
            id,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Correlation ids seeded from wall-clock milliseconds, strictly increasing
/// within one generator.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    last: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

#[derive(Debug, Default)]
struct SubscriptionState {
    streams: BTreeSet<String>,
    /// Connection generation the set has been replayed on, while it is open
    live_generation: Option<u64>,
}

/// Tracks the caller's intended subscriptions and keeps the server in sync
/// across physical reconnects.
///
/// Session events are relayed to the owner through [`take_receiver`](Self::take_receiver);
/// `Opened` is always delivered before the replay for that connection is sent.
#[derive(Debug)]
pub struct SubscriptionManager {
    session: Arc<ConnectionSession>,
    state: Arc<Mutex<SubscriptionState>>,
    ids: Arc<RequestIdGenerator>,
    pump: Mutex<Option<EventPump>>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl SubscriptionManager {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(config: SessionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let mut session = ConnectionSession::with_connector(config, connector)?;
        let session_rx = session.take_receiver().ok_or_else(|| {
            BinanceError::Config("session event receiver already taken".to_string())
        })?;
        let session = Arc::new(session);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SubscriptionState::default()));
        let ids = Arc::new(RequestIdGenerator::new());

        let pump = EventPump {
            session: session.clone(),
            state: state.clone(),
            ids: ids.clone(),
            session_rx,
            event_tx,
        };

        Ok(Self {
            session,
            state,
            ids,
            pump: Mutex::new(Some(pump)),
            pump_handle: Mutex::new(None),
            event_rx: Some(event_rx),
        })
    }

    /// Get the event receiver
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe_state()
    }

    /// Start the underlying session
    pub fn connect(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BinanceError::Config(
                "connect requires a running tokio runtime".to_string(),
            ));
        }

        if let Some(pump) = self.pump.lock().take() {
            *self.pump_handle.lock() = Some(tokio::spawn(pump.run()));
        }
        self.session.connect()
    }

    /// Track `streams`; newly added ones go out immediately when a connection
    /// is live. Returns the identifiers that were not tracked before.
    pub fn subscribe<I, S>(&self, streams: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        let added: Vec<String> = streams
            .into_iter()
            .map(Into::into)
            .filter(|stream| state.streams.insert(stream.clone()))
            .collect();

        if added.is_empty() {
            return Ok(added);
        }

        match state.live_generation {
            Some(generation) => {
                let message = ControlMessage::subscribe(added.clone(), self.ids.next());
                info!(streams = ?added, id = message.id, "subscribing");
                self.session.send_to(generation, message.to_json()?)?;
            }
            None => debug!(streams = ?added, "not connected; subscription deferred to replay"),
        }
        Ok(added)
    }

    /// Stop tracking `streams`. Identifiers not currently tracked are ignored.
    pub fn unsubscribe<I, S>(&self, streams: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let removed: Vec<String> = streams
            .into_iter()
            .filter_map(|stream| state.streams.take(stream.as_ref()))
            .collect();

        if removed.is_empty() {
            return Ok(removed);
        }

        if let Some(generation) = state.live_generation {
            let message = ControlMessage::unsubscribe(removed.clone(), self.ids.next());
            info!(streams = ?removed, id = message.id, "unsubscribing");
            self.session.send_to(generation, message.to_json()?)?;
        }
        Ok(removed)
    }

    /// Current tracked set, sorted
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().streams.iter().cloned().collect()
    }

    pub fn close(&self) {
        self.session.close();
    }

    /// Close the session and wait for both background tasks to finish
    pub async fn shutdown_and_wait(&self) {
        self.session.shutdown_and_wait().await;
        let handle = self.pump_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            warn!(error = %err, "subscription event pump failed");
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.session.close();
    }
}

#[derive(Debug)]
struct EventPump {
    session: Arc<ConnectionSession>,
    state: Arc<Mutex<SubscriptionState>>,
    ids: Arc<RequestIdGenerator>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventPump {
    async fn run(mut self) {
        while let Some(event) = self.session_rx.recv().await {
            let opened = match event {
                SessionEvent::Opened { generation } => Some(generation),
                SessionEvent::Closed { .. } | SessionEvent::ReconnectExhausted { .. } => {
                    self.state.lock().live_generation = None;
                    None
                }
                _ => None,
            };
            let _ = self.event_tx.send(event);
            if let Some(generation) = opened {
                self.replay(generation);
            }
        }
        debug!("session event stream ended");
    }

    fn replay(&self, generation: u64) {
        let mut state = self.state.lock();
        state.live_generation = Some(generation);
        if state.streams.is_empty() {
            return;
        }

        let params: Vec<String> = state.streams.iter().cloned().collect();
        let message = ControlMessage::subscribe(params, self.ids.next());
        info!(
            generation,
            count = message.params.len(),
            id = message.id,
            "replaying subscriptions"
        );
        let sent = message
            .to_json()
            .and_then(|payload| self.session.send_to(generation, payload));
        if let Err(err) = sent {
            warn!(generation, error = %err, "failed to queue subscription replay");
        }
    }
}
