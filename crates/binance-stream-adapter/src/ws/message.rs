/*
[INPUT]:  Raw text payloads delivered by the stream session
[OUTPUT]: Parsed MarketFrame values (events, control responses, errors)
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding new message types or changing format
*/

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    DepthUpdateEvent, KlineEvent, PartialDepthEvent, TickerEvent, TradeEvent,
};

/// One decoded inbound payload.
///
/// `stream` is only populated for frames received on the combined
/// (`/stream?streams=`) endpoint, where the payload is wrapped in
/// `{"stream": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketFrame {
    pub stream: Option<String>,
    pub event: MarketEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Trade(TradeEvent),
    DepthUpdate(DepthUpdateEvent),
    PartialDepth(PartialDepthEvent),
    Kline(KlineEvent),
    Ticker(TickerEvent),
    AllTickers(Vec<TickerEvent>),
    /// Acknowledgement of a SUBSCRIBE/UNSUBSCRIBE request
    Response { id: u64, result: Value },
    /// Server rejected a control request
    Error {
        code: i64,
        msg: String,
        id: Option<u64>,
    },
    /// Valid JSON this crate has no typed model for
    Unknown(Value),
}

impl MarketEvent {
    /// Short label used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::Trade(_) => "trade",
            MarketEvent::DepthUpdate(_) => "depth_update",
            MarketEvent::PartialDepth(_) => "partial_depth",
            MarketEvent::Kline(_) => "kline",
            MarketEvent::Ticker(_) => "ticker",
            MarketEvent::AllTickers(_) => "all_tickers",
            MarketEvent::Response { .. } => "response",
            MarketEvent::Error { .. } => "error",
            MarketEvent::Unknown(_) => "unknown",
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            MarketEvent::Trade(e) => Some(&e.symbol),
            MarketEvent::DepthUpdate(e) => Some(&e.symbol),
            MarketEvent::Kline(e) => Some(&e.symbol),
            MarketEvent::Ticker(e) => Some(&e.symbol),
            _ => None,
        }
    }
}

/// Decode a text payload.
///
/// Fails only when the payload is not JSON or when a recognised event type
/// does not match its schema; unrecognised JSON becomes [`MarketEvent::Unknown`].
pub fn decode_frame(raw: &str) -> Result<MarketFrame> {
    let value: Value = serde_json::from_str(raw)?;

    if let Some(Value::String(stream)) = value.get("stream")
        && let Some(data) = value.get("data")
    {
        return Ok(MarketFrame {
            stream: Some(stream.clone()),
            event: decode_event(data)?,
        });
    }

    Ok(MarketFrame {
        stream: None,
        event: decode_event(&value)?,
    })
}

fn decode_event(value: &Value) -> Result<MarketEvent> {
    let map = match value {
        Value::Array(_) => {
            return Ok(MarketEvent::AllTickers(Vec::<TickerEvent>::deserialize(
                value,
            )?));
        }
        Value::Object(map) => map,
        _ => return Ok(MarketEvent::Unknown(value.clone())),
    };

    let id = map.get("id").and_then(Value::as_u64);

    if let Some(error) = map.get("error").filter(|e| e.is_object()) {
        return Ok(MarketEvent::Error {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            msg: error
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id,
        });
    }

    if let Some(code) = map.get("code").and_then(Value::as_i64)
        && let Some(msg) = map.get("msg").and_then(Value::as_str)
    {
        return Ok(MarketEvent::Error {
            code,
            msg: msg.to_string(),
            id,
        });
    }

    if let Some(id) = id
        && let Some(result) = map.get("result")
    {
        return Ok(MarketEvent::Response {
            id,
            result: result.clone(),
        });
    }

    let event = match map.get("e").and_then(Value::as_str) {
        Some("trade") => MarketEvent::Trade(TradeEvent::deserialize(value)?),
        Some("depthUpdate") => MarketEvent::DepthUpdate(DepthUpdateEvent::deserialize(value)?),
        Some("kline") => MarketEvent::Kline(KlineEvent::deserialize(value)?),
        Some("24hrTicker") => MarketEvent::Ticker(TickerEvent::deserialize(value)?),
        _ if map.contains_key("lastUpdateId") => {
            MarketEvent::PartialDepth(PartialDepthEvent::deserialize(value)?)
        }
        _ => MarketEvent::Unknown(value.clone()),
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BinanceError;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const TRADE: &str = r#"{"e":"trade","E":1672515782136,"s":"BTCUSDT","t":12345,"p":"42000.10","q":"0.5","T":1672515782136,"m":false,"M":true}"#;

    #[test]
    fn test_decode_raw_trade() {
        let frame = decode_frame(TRADE).unwrap();
        assert!(frame.stream.is_none());
        match frame.event {
            MarketEvent::Trade(trade) => {
                assert_eq!(trade.symbol, "BTCUSDT");
                assert_eq!(trade.price, Decimal::from_str("42000.10").unwrap());
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_combined_envelope() {
        let raw = format!(r#"{{"stream":"btcusdt@trade","data":{TRADE}}}"#);
        let frame = decode_frame(&raw).unwrap();
        assert_eq!(frame.stream.as_deref(), Some("btcusdt@trade"));
        assert_eq!(frame.event.kind(), "trade");
        assert_eq!(frame.event.symbol(), Some("BTCUSDT"));
    }

    #[test]
    fn test_decode_partial_depth() {
        let raw = r#"{"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"]]}"#;
        let frame = decode_frame(raw).unwrap();
        match frame.event {
            MarketEvent::PartialDepth(depth) => {
                assert_eq!(depth.last_update_id, 160);
                assert_eq!(depth.bids.len(), 1);
            }
            other => panic!("expected partial depth, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_depth_update() {
        let raw = r#"{"e":"depthUpdate","E":1672515782136,"s":"BNBBTC","U":157,"u":160,"b":[["0.0024","10"]],"a":[]}"#;
        let frame = decode_frame(raw).unwrap();
        match frame.event {
            MarketEvent::DepthUpdate(update) => {
                assert_eq!(update.first_update_id, 157);
                assert_eq!(update.final_update_id, 160);
                assert!(update.asks.is_empty());
            }
            other => panic!("expected depth update, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_subscribe_ack() {
        let frame = decode_frame(r#"{"result":null,"id":1700000000000}"#).unwrap();
        assert_eq!(
            frame.event,
            MarketEvent::Response {
                id: 1_700_000_000_000,
                result: Value::Null
            }
        );
    }

    #[test]
    fn test_decode_errors() {
        let flat = decode_frame(r#"{"code":2,"msg":"Invalid request","id":7}"#).unwrap();
        assert_eq!(
            flat.event,
            MarketEvent::Error {
                code: 2,
                msg: "Invalid request".to_string(),
                id: Some(7)
            }
        );

        let nested =
            decode_frame(r#"{"error":{"code":3,"msg":"Invalid JSON"},"id":null}"#).unwrap();
        assert!(matches!(
            nested.event,
            MarketEvent::Error { code: 3, id: None, .. }
        ));
    }

    #[test]
    fn test_unknown_and_invalid_payloads() {
        let frame = decode_frame(r#"{"e":"aggTrade","s":"BTCUSDT"}"#).unwrap();
        assert_eq!(frame.event.kind(), "unknown");

        assert!(matches!(
            decode_frame("not json"),
            Err(BinanceError::Serialization(_))
        ));
        assert!(decode_frame(r#"{"e":"trade","s":"BTCUSDT"}"#).is_err());
    }
}
