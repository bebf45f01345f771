/*
[INPUT]:  Optional symbol filters
[OUTPUT]: Connectivity check, server time, exchange metadata
[POS]:    HTTP layer - public market data endpoints (no auth required)
[UPDATE]: When adding new public endpoints or changing response format
*/

use reqwest::Method;
use serde_json::Value;

use crate::error::Result;
use crate::http::BinanceClient;
use crate::types::{ExchangeInfo, ServerTime};

impl BinanceClient {
    /// Test connectivity
    ///
    /// GET /api/v3/ping
    pub async fn ping(&self) -> Result<()> {
        let builder = self.request(Method::GET, "/api/v3/ping")?;
        let _: Value = self.send_json(builder).await?;
        Ok(())
    }

    /// GET /api/v3/time
    pub async fn server_time(&self) -> Result<ServerTime> {
        let builder = self.request(Method::GET, "/api/v3/time")?;
        self.send_json(builder).await
    }

    /// Exchange trading rules, optionally narrowed to one symbol
    ///
    /// GET /api/v3/exchangeInfo[?symbol={symbol}]
    pub async fn exchange_info(&self, symbol: Option<&str>) -> Result<ExchangeInfo> {
        let mut builder = self.request(Method::GET, "/api/v3/exchangeInfo")?;
        if let Some(symbol) = symbol {
            builder = builder.query(&[("symbol", symbol.to_uppercase())]);
        }
        self.send_json(builder).await
    }
}
