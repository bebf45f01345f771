/*
[INPUT]:  SubscriptionManager events, trade/depth subscription requests
[OUTPUT]: Decoded market events logged and folded into StreamMetrics
[POS]:    Data layer - market data consumption on top of the resilient stream
[UPDATE]: When changing subscription helpers, decode handling, or exit conditions
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use binance_stream_adapter::types::DepthLevel;
use binance_stream_adapter::ws::{depth_stream, trade_stream};
use binance_stream_adapter::{
    BinanceClient, BinanceError, ClientConfig, MarketEvent, SessionEvent, SubscriptionManager,
    decode_frame,
};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::StreamMetrics;

const DECODE_FAIL_LOG_LIMIT: usize = 5;
const UNKNOWN_LOG_LIMIT: usize = 5;
const RAW_LOG_MAX_BYTES: usize = 256;

static DECODE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static UNKNOWN_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Why [`MarketDataService::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    Shutdown,
    /// The session gave up reconnecting; the process should not keep running
    ReconnectExhausted,
}

/// Trade and depth consumer for one subscription manager
#[derive(Debug, Clone)]
pub struct MarketDataService {
    manager: Arc<SubscriptionManager>,
    metrics: Arc<Mutex<StreamMetrics>>,
}

impl MarketDataService {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self {
            manager,
            metrics: Arc::new(Mutex::new(StreamMetrics::default())),
        }
    }

    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    pub fn metrics(&self) -> Arc<Mutex<StreamMetrics>> {
        self.metrics.clone()
    }

    pub fn subscribe_to_trades(&self, symbol: &str) -> Result<Vec<String>, BinanceError> {
        self.manager.subscribe([trade_stream(symbol)])
    }

    pub fn unsubscribe_from_trades(&self, symbol: &str) -> Result<Vec<String>, BinanceError> {
        self.manager.unsubscribe([trade_stream(symbol)])
    }

    pub fn subscribe_to_depth(
        &self,
        symbol: &str,
        level: DepthLevel,
    ) -> Result<Vec<String>, BinanceError> {
        self.manager.subscribe([depth_stream(symbol, level)])
    }

    pub fn unsubscribe_from_depth(
        &self,
        symbol: &str,
        level: DepthLevel,
    ) -> Result<Vec<String>, BinanceError> {
        self.manager.unsubscribe([depth_stream(symbol, level)])
    }

    pub fn subscribe_streams<I, S>(&self, streams: I) -> Result<Vec<String>, BinanceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manager.subscribe(streams)
    }

    /// Consume owner events until shutdown, channel close, or reconnect exhaustion
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        shutdown: CancellationToken,
    ) -> ServiceExit {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("market data service stopping");
                    return ServiceExit::Shutdown;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("session event channel closed");
                        return ServiceExit::Shutdown;
                    };
                    if let Some(exit) = self.handle_event(event) {
                        return exit;
                    }
                }
            }
        }
    }

    fn handle_event(&self, event: SessionEvent) -> Option<ServiceExit> {
        match event {
            SessionEvent::Opened { generation } => {
                info!(
                    generation,
                    subscriptions = self.manager.subscriptions().len(),
                    "stream connected"
                );
                self.metrics.lock().record_open();
            }
            SessionEvent::Message { payload, .. } => self.handle_payload(&payload),
            SessionEvent::Closed { code, reason } => {
                warn!(code, reason = %reason, "stream disconnected");
            }
            SessionEvent::ReconnectScheduled { attempt, delay } => {
                info!(attempt, ?delay, "stream reconnect scheduled");
                self.metrics.lock().record_reconnect_scheduled();
            }
            SessionEvent::ReconnectExhausted { attempts } => {
                error!(attempts, "stream reconnect attempts exhausted");
                return Some(ServiceExit::ReconnectExhausted);
            }
        }
        None
    }

    fn handle_payload(&self, payload: &str) {
        self.metrics.lock().record_message();

        let frame = match decode_frame(payload) {
            Ok(frame) => frame,
            Err(err) => {
                self.metrics.lock().record_decode_failure();
                log_decode_fail_sampled(&err, payload);
                return;
            }
        };

        match frame.event {
            MarketEvent::Trade(trade) => {
                debug!(
                    symbol = %trade.symbol,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    buyer_maker = trade.is_buyer_maker,
                    "trade"
                );
                self.metrics.lock().record_trade(&trade.symbol, trade.price);
            }
            MarketEvent::PartialDepth(depth) => {
                debug!(
                    stream = frame.stream.as_deref().unwrap_or_default(),
                    last_update_id = depth.last_update_id,
                    best_bid = ?depth.bids.first().map(|level| level.price()),
                    best_ask = ?depth.asks.first().map(|level| level.price()),
                    "depth snapshot"
                );
            }
            MarketEvent::DepthUpdate(update) => {
                debug!(
                    symbol = %update.symbol,
                    first_update_id = update.first_update_id,
                    final_update_id = update.final_update_id,
                    "depth update"
                );
            }
            MarketEvent::Kline(kline) => {
                debug!(
                    symbol = %kline.symbol,
                    interval = %kline.kline.interval,
                    close = %kline.kline.close,
                    closed = kline.kline.is_closed,
                    "kline"
                );
            }
            MarketEvent::Ticker(ticker) => {
                debug!(symbol = %ticker.symbol, last_price = %ticker.last_price, "ticker");
            }
            MarketEvent::AllTickers(tickers) => {
                debug!(count = tickers.len(), "all market tickers");
            }
            MarketEvent::Response { id, result } => {
                debug!(id, %result, "control request acknowledged");
            }
            MarketEvent::Error { code, msg, id } => {
                warn!(code, msg = %msg, ?id, "stream rejected control request");
            }
            MarketEvent::Unknown(_) => log_unknown_sampled(payload),
        }
    }
}

/// Log the offset between the local clock and the exchange clock.
///
/// Returns the offset in milliseconds (server minus local); never fails the caller.
pub async fn check_server_clock(api_url: &str) -> Option<i64> {
    let client = match BinanceClient::with_base_url(ClientConfig::default(), api_url) {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "failed to build REST client for clock check");
            return None;
        }
    };

    match client.server_time().await {
        Ok(time) => {
            let offset_ms = time.server_time - Utc::now().timestamp_millis();
            info!(offset_ms, "exchange clock checked");
            Some(offset_ms)
        }
        Err(err) => {
            warn!(error = %err, "exchange clock check failed");
            None
        }
    }
}

fn log_decode_fail_sampled(err: &BinanceError, raw: &str) {
    let count = DECODE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < DECODE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = DECODE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "stream message decode failed"
        );
        debug!(preview = %truncate_for_log(raw, RAW_LOG_MAX_BYTES), "undecodable stream message");
    }
}

fn log_unknown_sampled(raw: &str) {
    let count = UNKNOWN_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < UNKNOWN_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = UNKNOWN_LOG_LIMIT,
            bytes = raw.len(),
            "unrecognised stream message"
        );
        debug!(preview = %truncate_for_log(raw, RAW_LOG_MAX_BYTES), "unrecognised stream message body");
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use binance_stream_adapter::SessionConfig;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> MarketDataService {
        let manager = SubscriptionManager::new(SessionConfig::default()).unwrap();
        MarketDataService::new(Arc::new(manager))
    }

    fn message(payload: &str) -> SessionEvent {
        SessionEvent::Message {
            generation: 1,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_subscription_helpers_use_stream_names() {
        let service = service();
        assert_eq!(service.subscribe_to_trades("BTCUSDT").unwrap(), vec!["btcusdt@trade"]);
        assert_eq!(
            service.subscribe_to_depth("ETHUSDT", DepthLevel::default()).unwrap(),
            vec!["ethusdt@depth5"]
        );
        assert!(service.subscribe_to_trades("btcusdt").unwrap().is_empty());

        service.unsubscribe_from_depth("ethusdt", DepthLevel::Five).unwrap();
        assert_eq!(service.manager().subscriptions(), vec!["btcusdt@trade"]);
        service.unsubscribe_from_trades("BTCUSDT").unwrap();
        assert!(service.manager().subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failures_do_not_stop_the_loop() {
        let service = service();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tx.send(message("not json")).unwrap();
        tx.send(message(
            r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"42000.5","q":"1","T":1,"m":false}"#,
        ))
        .unwrap();
        tx.send(SessionEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_secs(5),
        })
        .unwrap();
        drop(tx);

        assert_eq!(service.run(rx, shutdown).await, ServiceExit::Shutdown);

        let snapshot = service.metrics().lock().snapshot();
        assert_eq!(snapshot.messages, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.reconnects_scheduled, 1);
        assert_eq!(
            snapshot.last_trade_prices["BTCUSDT"],
            Decimal::new(420005, 1)
        );
    }

    #[tokio::test]
    async fn test_exhaustion_ends_the_loop() {
        let service = service();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionEvent::ReconnectExhausted { attempts: 10 }).unwrap();

        let exit = service.run(rx, CancellationToken::new()).await;
        assert_eq!(exit, ServiceExit::ReconnectExhausted);
        drop(tx);
    }

    #[tokio::test]
    async fn test_shutdown_token_ends_the_loop() {
        let service = service();
        let (_tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert_eq!(service.run(rx, shutdown).await, ServiceExit::Shutdown);
    }

    #[tokio::test]
    async fn test_check_server_clock() {
        let server = MockServer::start().await;
        let now = Utc::now().timestamp_millis();
        Mock::given(method("GET"))
            .and(path("/api/v3/time"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!(r#"{{"serverTime":{now}}}"#)),
            )
            .mount(&server)
            .await;

        let offset = check_server_clock(&server.uri()).await.unwrap();
        assert!(offset.abs() < 60_000);
    }

    #[tokio::test]
    async fn test_check_server_clock_tolerates_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/time"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(check_server_clock(&server.uri()).await.is_none());
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("abc", 10), "abc");
        assert_eq!(truncate_for_log("abcdef", 3), "abc...");
        assert_eq!(truncate_for_log("ééé", 3), "é...");
    }
}
