/*
[INPUT]:  Trading symbol and channel parameters
[OUTPUT]: Stream identifiers understood by SUBSCRIBE/UNSUBSCRIBE
[POS]:    WebSocket layer - stream naming helpers
[UPDATE]: When adding new stream channels
*/

use crate::types::DepthLevel;

/// `btcusdt@trade`
pub fn trade_stream(symbol: &str) -> String {
    format!("{}@trade", symbol.to_lowercase())
}

/// Partial book depth, e.g. `btcusdt@depth5`
pub fn depth_stream(symbol: &str, level: DepthLevel) -> String {
    format!("{}@depth{}", symbol.to_lowercase(), level.as_u8())
}

/// Diff depth updates, e.g. `btcusdt@depth`
pub fn diff_depth_stream(symbol: &str) -> String {
    format!("{}@depth", symbol.to_lowercase())
}

/// `btcusdt@kline_1m`
pub fn kline_stream(symbol: &str, interval: &str) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), interval)
}

/// Individual symbol 24hr ticker, e.g. `btcusdt@ticker`
pub fn ticker_stream(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

/// All market 24hr tickers
pub const ALL_TICKERS_STREAM: &str = "!ticker@arr";
