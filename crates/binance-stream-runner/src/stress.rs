/*
[INPUT]:  Connection count, run duration, session settings, transport connector
[OUTPUT]: StressReport with initiated/failed/open counts and messages received
[POS]:    Tooling - many independent sessions in parallel against one endpoint
[UPDATE]: When changing batching, reporting cadence, or the seed pair list
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use binance_stream_adapter::ws::{Connector, kline_stream};
use binance_stream_adapter::{SessionConfig, SessionEvent, SubscriptionManager};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pairs cycled through when assigning one kline stream per connection
pub const SEED_PAIRS: &[&str] = &[
    "btcusdt", "ethusdt", "bnbusdt", "solusdt", "xrpusdt", "adausdt", "dogeusdt", "avaxusdt",
    "dotusdt", "linkusdt", "ltcusdt", "trxusdt", "atomusdt", "uniusdt", "etcusdt", "xlmusdt",
    "nearusdt", "aptusdt", "filusdt", "arbusdt",
];

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub connections: usize,
    pub duration: Duration,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub report_interval: Duration,
    pub session: SessionConfig,
}

impl StressConfig {
    pub fn new(connections: usize, duration: Duration, session: SessionConfig) -> Self {
        Self {
            connections,
            duration,
            batch_size: 20,
            batch_pause: Duration::from_secs(1),
            report_interval: Duration::from_secs(30),
            session,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StressReport {
    pub initiated: usize,
    pub failed: usize,
    pub open_at_end: usize,
    pub messages: u64,
}

/// `<pair>@kline_1m` for connection `index`
pub fn stream_for(index: usize) -> String {
    kline_stream(SEED_PAIRS[index % SEED_PAIRS.len()], "1m")
}

/// Open `connections` managers in batches, hold them for `duration`, then close all
pub async fn run_stress(
    config: StressConfig,
    connector: Arc<dyn Connector>,
    shutdown: CancellationToken,
) -> StressReport {
    let started = Instant::now();
    let messages = Arc::new(AtomicU64::new(0));
    let mut managers = Vec::with_capacity(config.connections);
    let mut report = StressReport::default();
    let batch_size = config.batch_size.max(1);

    info!(
        connections = config.connections,
        duration = ?config.duration,
        batch_size,
        "starting stress run"
    );

    'spawn: for index in 0..config.connections {
        if shutdown.is_cancelled() {
            break 'spawn;
        }
        if index > 0 && index % batch_size == 0 {
            info!(opened = index, "batch started; pausing");
            tokio::select! {
                _ = shutdown.cancelled() => break 'spawn,
                _ = tokio::time::sleep(config.batch_pause) => {}
            }
        }

        report.initiated += 1;
        match start_connection(index, &config.session, connector.clone(), messages.clone()) {
            Ok(manager) => managers.push(manager),
            Err(err) => {
                report.failed += 1;
                warn!(index, error = %err, "failed to start stress connection");
            }
        }
    }

    let deadline = started + config.duration;
    let mut monitor =
        tokio::time::interval_at(Instant::now() + config.report_interval, config.report_interval);
    monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("stress run interrupted");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => break,
            _ = monitor.tick() => {
                info!(
                    open = count_open(&managers),
                    total = managers.len(),
                    messages = messages.load(Ordering::Relaxed),
                    "stress progress"
                );
            }
        }
    }

    report.open_at_end = count_open(&managers);
    join_all(managers.iter().map(|manager| manager.shutdown_and_wait())).await;
    report.messages = messages.load(Ordering::Relaxed);

    info!(
        initiated = report.initiated,
        failed = report.failed,
        open = report.open_at_end,
        messages = report.messages,
        "stress run finished"
    );
    report
}

fn start_connection(
    index: usize,
    session: &SessionConfig,
    connector: Arc<dyn Connector>,
    messages: Arc<AtomicU64>,
) -> binance_stream_adapter::Result<SubscriptionManager> {
    let mut manager = SubscriptionManager::with_connector(session.clone(), connector)?;
    if let Some(mut events) = manager.take_receiver() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Message { .. } => {
                        messages.fetch_add(1, Ordering::Relaxed);
                    }
                    SessionEvent::ReconnectExhausted { attempts } => {
                        warn!(index, attempts, "stress connection gave up");
                    }
                    _ => {}
                }
            }
        });
    }
    manager.subscribe([stream_for(index)])?;
    manager.connect()?;
    Ok(manager)
}

fn count_open(managers: &[SubscriptionManager]) -> usize {
    managers
        .iter()
        .filter(|manager| manager.session().is_open())
        .count()
}
