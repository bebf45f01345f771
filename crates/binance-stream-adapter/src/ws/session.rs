/*
[INPUT]:  Session configuration, transport connector, outbound payloads
[OUTPUT]: Lifecycle + raw message events over an mpsc channel
[POS]:    WebSocket layer - connect/heartbeat/liveness/backoff state machine
[UPDATE]: When changing reconnect policy, heartbeat protocol, or event ordering
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BinanceError, Result};

use super::backoff::BackoffSchedule;
use super::config::SessionConfig;
use super::transport::{Connector, TungsteniteConnector, WsReader, WsWriter};

/// Close code for a caller-initiated close
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code when the peer sent a Close frame without a status
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code for drops, errors and liveness terminations
pub const CLOSE_ABNORMAL: u16 = 1006;

const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, `connect()` not yet called
    Idle,
    Connecting,
    Open,
    /// Caller-initiated graceful close in progress
    Closing,
    /// Waiting out a backoff delay
    Reconnecting,
    /// Closed manually or out of reconnect attempts; never leaves this state
    Terminal,
}

/// Notifications delivered to the session owner, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new physical connection is established
    Opened { generation: u64 },
    /// Raw text payload received on connection `generation`
    Message { generation: u64, payload: String },
    Closed { code: u16, reason: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Fatal: the session gave up after `attempts` reconnects
    ReconnectExhausted { attempts: u32 },
}

#[derive(Debug)]
enum SessionCommand {
    Send { generation: u64, payload: String },
}

#[derive(Debug, Clone)]
struct CloseInfo {
    code: u16,
    reason: String,
}

impl CloseInfo {
    fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
        }
    }

    fn from_frame(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_string(),
            },
            None => Self {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
        }
    }
}

enum StreamExit {
    Disconnected(CloseInfo),
    Shutdown,
}

/// One logical connection to a stream endpoint.
///
/// The physical socket lives inside a driver task spawned on the first
/// [`connect`](Self::connect). The task reconnects with exponential backoff
/// until [`close`](Self::close) is called or `max_reconnect_attempts`
/// consecutive connections fail.
#[derive(Debug)]
pub struct ConnectionSession {
    url: String,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Sender<SessionState>,
    generation: Arc<AtomicU64>,
    shutdown: CancellationToken,
    worker: Mutex<Option<SessionWorker>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl ConnectionSession {
    /// Create a session that connects through tokio-tungstenite
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Create a session with a custom transport
    pub fn with_connector(config: SessionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state, _rx) = watch::channel(SessionState::Idle);
        let generation = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let worker = SessionWorker {
            schedule: config.backoff(),
            url: config.url.clone(),
            config,
            connector,
            cmd_rx,
            event_tx,
            state: state.clone(),
            generation: generation.clone(),
            shutdown: shutdown.clone(),
            reconnect_attempts: 0,
            next_generation: 0,
        };

        Ok(Self {
            url: worker.url.clone(),
            cmd_tx,
            state,
            generation,
            shutdown,
            worker: Mutex::new(Some(worker)),
            worker_handle: Mutex::new(None),
            event_rx: Some(event_rx),
        })
    }

    /// Get the event receiver
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Subscribe to state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Generation of the most recently opened connection (0 before the first open)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Start connecting. No-op when already open or a connect is in flight.
    pub fn connect(&self) -> Result<()> {
        match self.state() {
            SessionState::Open => {
                info!(url = %self.url, "websocket already connected");
                return Ok(());
            }
            SessionState::Closing | SessionState::Terminal => {
                return Err(BinanceError::SessionClosed);
            }
            SessionState::Idle | SessionState::Connecting | SessionState::Reconnecting => {}
        }

        if self.shutdown.is_cancelled() {
            return Err(BinanceError::SessionClosed);
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BinanceError::Config(
                "connect requires a running tokio runtime".to_string(),
            ));
        }

        let Some(worker) = self.worker.lock().take() else {
            debug!(url = %self.url, state = ?self.state(), "connection attempt already in progress");
            return Ok(());
        };

        self.state.send_replace(SessionState::Connecting);
        let handle = tokio::spawn(worker.run());
        *self.worker_handle.lock() = Some(handle);
        Ok(())
    }

    /// Queue a text frame on the open connection.
    ///
    /// Fails with [`BinanceError::NotConnected`] unless the session is open.
    /// Never blocks; delivery is not acknowledged.
    pub fn send(&self, payload: impl Into<String>) -> Result<()> {
        if !self.is_open() {
            return Err(BinanceError::NotConnected);
        }
        self.send_to(self.generation(), payload.into())
    }

    /// Queue a text frame for one specific connection. Dropped by the driver
    /// if that connection is no longer the live one.
    pub(crate) fn send_to(&self, generation: u64, payload: String) -> Result<()> {
        self.cmd_tx
            .send(SessionCommand::Send { generation, payload })
            .map_err(|_| BinanceError::NotConnected)
    }

    /// Close the session for good. Idempotent; cancels any pending reconnect.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            debug!(url = %self.url, "websocket session already closed");
            return;
        }

        info!(url = %self.url, "closing websocket session");
        self.shutdown.cancel();

        // never started: no driver left to publish the final state
        if self.worker.lock().take().is_some() {
            self.state.send_replace(SessionState::Terminal);
        }
    }

    /// Close and wait for the driver task to finish
    pub async fn shutdown_and_wait(&self) {
        self.close();
        let handle = self.worker_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            warn!(url = %self.url, error = %err, "websocket driver task failed");
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug)]
struct SessionWorker {
    url: String,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    schedule: BackoffSchedule,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
    generation: Arc<AtomicU64>,
    shutdown: CancellationToken,
    reconnect_attempts: u32,
    next_generation: u64,
}

impl SessionWorker {
    async fn run(mut self) {
        'run: loop {
            if self.shutdown.is_cancelled() {
                break 'run;
            }

            self.set_state(SessionState::Connecting);
            info!(
                url = %self.url,
                attempt = self.reconnect_attempts,
                "connecting to websocket"
            );

            let open_timeout = self.config.liveness_timeout();
            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'run,
                result = tokio::time::timeout(open_timeout, self.connector.connect(&self.url)) => result,
            };

            let close = match outcome {
                Ok(Ok((writer, reader))) => {
                    self.next_generation += 1;
                    let generation = self.next_generation;
                    self.reconnect_attempts = 0;
                    self.generation.store(generation, Ordering::Release);
                    self.set_state(SessionState::Open);
                    info!(url = %self.url, generation, "websocket connection established");
                    self.emit(SessionEvent::Opened { generation });

                    match self.stream_loop(generation, writer, reader).await {
                        StreamExit::Shutdown => {
                            self.emit(SessionEvent::Closed {
                                code: CLOSE_NORMAL,
                                reason: "closed by client".to_string(),
                            });
                            break 'run;
                        }
                        StreamExit::Disconnected(close) => close,
                    }
                }
                Ok(Err(err)) => CloseInfo::abnormal(err.to_string()),
                Err(_) => CloseInfo::abnormal(format!(
                    "connection not established within {open_timeout:?}"
                )),
            };

            // socket and its timers are gone by now
            warn!(
                url = %self.url,
                code = close.code,
                reason = %close.reason,
                "websocket connection closed"
            );
            self.emit(SessionEvent::Closed {
                code: close.code,
                reason: close.reason,
            });

            if self.shutdown.is_cancelled() {
                break 'run;
            }

            if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                error!(
                    url = %self.url,
                    max_reconnect_attempts = self.config.max_reconnect_attempts,
                    "max reconnect attempts reached; giving up"
                );
                self.set_state(SessionState::Terminal);
                self.emit(SessionEvent::ReconnectExhausted {
                    attempts: self.reconnect_attempts,
                });
                return;
            }

            self.reconnect_attempts += 1;
            let delay = self.schedule.delay(self.reconnect_attempts);
            self.set_state(SessionState::Reconnecting);
            info!(
                url = %self.url,
                attempt = self.reconnect_attempts,
                max_reconnect_attempts = self.config.max_reconnect_attempts,
                ?delay,
                "scheduling websocket reconnect"
            );
            self.emit(SessionEvent::ReconnectScheduled {
                attempt: self.reconnect_attempts,
                delay,
            });

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(url = %self.url, "pending reconnect cancelled");
                    break 'run;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(SessionState::Terminal);
    }

    async fn stream_loop(
        &mut self,
        generation: u64,
        mut writer: WsWriter,
        mut reader: WsReader,
    ) -> StreamExit {
        let heartbeat_every = self.config.heartbeat_interval();
        let liveness_timeout = self.config.liveness_timeout();

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let liveness = tokio::time::sleep(liveness_timeout);
        tokio::pin!(liveness);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.set_state(SessionState::Closing);
                    graceful_close(&mut writer).await;
                    return StreamExit::Shutdown;
                }
                () = &mut liveness => {
                    warn!(
                        url = %self.url,
                        generation,
                        ?liveness_timeout,
                        "no message or pong received; terminating connection"
                    );
                    return StreamExit::Disconnected(CloseInfo::abnormal("liveness timeout"));
                }
                _ = heartbeat.tick() => {
                    debug!(generation, "sending ping");
                    if let Err(err) = writer.send(WsMessage::Ping(Vec::new().into())).await {
                        return StreamExit::Disconnected(CloseInfo::abnormal(err.to_string()));
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Send { generation: target, payload }) => {
                            if target != generation {
                                debug!(target, generation, "dropping payload queued for a previous connection");
                                continue;
                            }
                            if let Err(err) = writer.send(WsMessage::Text(payload.into())).await {
                                return StreamExit::Disconnected(CloseInfo::abnormal(err.to_string()));
                            }
                        }
                        None => {
                            graceful_close(&mut writer).await;
                            return StreamExit::Shutdown;
                        }
                    }
                }
                frame = reader.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            return StreamExit::Disconnected(CloseInfo::abnormal(err.to_string()));
                        }
                        None => {
                            return StreamExit::Disconnected(CloseInfo::abnormal("stream ended"));
                        }
                    };

                    liveness.as_mut().reset(Instant::now() + liveness_timeout);

                    match message {
                        WsMessage::Text(text) => {
                            self.emit(SessionEvent::Message {
                                generation,
                                payload: text.as_str().to_string(),
                            });
                        }
                        WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                            Ok(payload) => self.emit(SessionEvent::Message { generation, payload }),
                            Err(err) => debug!(error = %err, bytes = bytes.len(), "dropping non-utf8 binary frame"),
                        },
                        WsMessage::Ping(data) => {
                            debug!(generation, "received ping, sending pong");
                            if let Err(err) = writer.send(WsMessage::Pong(data)).await {
                                return StreamExit::Disconnected(CloseInfo::abnormal(err.to_string()));
                            }
                        }
                        WsMessage::Pong(_) => {
                            trace!(generation, "received pong");
                        }
                        WsMessage::Close(frame) => {
                            return StreamExit::Disconnected(CloseInfo::from_frame(frame));
                        }
                        WsMessage::Frame(_) => {}
                    }
                }
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn graceful_close(writer: &mut WsWriter) {
    let close = async {
        writer.send(WsMessage::Close(None)).await?;
        writer.close().await
    };
    match tokio::time::timeout(GRACEFUL_CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(error = %err, "graceful close failed"),
        Err(_) => debug!("graceful close timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_info_from_frame() {
        let info = CloseInfo::from_frame(None);
        assert_eq!(info.code, CLOSE_NO_STATUS);

        let frame = CloseFrame {
            code: 1001u16.into(),
            reason: "going away".to_string().into(),
        };
        let info = CloseInfo::from_frame(Some(frame));
        assert_eq!(info.code, 1001);
        assert_eq!(info.reason, "going away");
    }

    #[test]
    fn test_send_before_connect_is_not_connected() {
        let session = ConnectionSession::new(SessionConfig::default()).expect("valid config");
        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(
            session.send("{}"),
            Err(BinanceError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_without_runtime_fails() {
        let session = ConnectionSession::new(SessionConfig::default()).expect("valid config");
        assert!(matches!(session.connect(), Err(BinanceError::Config(_))));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_close_before_connect_is_terminal_and_idempotent() {
        let session = ConnectionSession::new(SessionConfig::default()).expect("valid config");
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Terminal);
        assert!(matches!(session.connect(), Err(BinanceError::SessionClosed)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig::new("http://example.com");
        assert!(ConnectionSession::new(config).is_err());
    }
}
