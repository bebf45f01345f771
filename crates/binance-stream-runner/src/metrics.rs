/*
[INPUT]:  Stream events observed by the market data service
[OUTPUT]: Snapshot-friendly stream metrics for the status endpoint
[POS]:    Shared runtime metrics between the service loop and the status server
[UPDATE]: When adding/removing stream-level runtime signals
*/

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamMetricsSnapshot {
    pub connections_opened: u64,
    pub messages: u64,
    pub decode_failures: u64,
    pub reconnects_scheduled: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_trade_prices: BTreeMap<String, Decimal>,
}

#[derive(Debug, Default)]
pub struct StreamMetrics {
    connections_opened: u64,
    messages: u64,
    decode_failures: u64,
    reconnects_scheduled: u64,
    last_message_at: Option<DateTime<Utc>>,
    last_trade_prices: BTreeMap<String, Decimal>,
}

impl StreamMetrics {
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            connections_opened: self.connections_opened,
            messages: self.messages,
            decode_failures: self.decode_failures,
            reconnects_scheduled: self.reconnects_scheduled,
            last_message_at: self.last_message_at,
            last_trade_prices: self.last_trade_prices.clone(),
        }
    }

    pub fn record_open(&mut self) {
        self.connections_opened += 1;
    }

    pub fn record_message(&mut self) {
        self.messages += 1;
        self.last_message_at = Some(Utc::now());
    }

    pub fn record_decode_failure(&mut self) {
        self.decode_failures += 1;
    }

    pub fn record_reconnect_scheduled(&mut self) {
        self.reconnects_scheduled += 1;
    }

    pub fn record_trade(&mut self, symbol: &str, price: Decimal) {
        self.last_trade_prices.insert(symbol.to_string(), price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let mut metrics = StreamMetrics::default();
        assert!(metrics.snapshot().last_message_at.is_none());

        metrics.record_open();
        metrics.record_message();
        metrics.record_message();
        metrics.record_decode_failure();
        metrics.record_trade("BTCUSDT", Decimal::new(420001, 1));
        metrics.record_trade("BTCUSDT", Decimal::new(420002, 1));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_opened, 1);
        assert_eq!(snapshot.messages, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert!(snapshot.last_message_at.is_some());
        assert_eq!(snapshot.last_trade_prices["BTCUSDT"], Decimal::new(420002, 1));
    }
}
