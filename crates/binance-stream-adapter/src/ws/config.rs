/*
[INPUT]:  Endpoint URL, reconnect limits, heartbeat window
[OUTPUT]: Validated session configuration with derived timer durations
[POS]:    WebSocket layer - connection session configuration
[UPDATE]: When adding session options or changing defaults
*/

use std::time::Duration;

use url::Url;

use crate::error::{BinanceError, Result};

use super::backoff::BackoffSchedule;

/// Default Binance raw stream endpoint
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/ws";

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);
const DEFAULT_HEARTBEAT_WINDOW: Duration = Duration::from_secs(30);
const DEFAULT_LIVENESS_GRACE: Duration = Duration::from_secs(5);

/// Configuration for a single [`ConnectionSession`](super::ConnectionSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Target endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Consecutive failed connections tolerated before giving up
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt
    pub base_backoff: Duration,
    /// Ceiling for the reconnect delay
    pub max_backoff: Duration,
    /// Pings go out every half window
    pub heartbeat_window: Duration,
    /// Extra silence tolerated on top of the heartbeat window
    pub liveness_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            heartbeat_window: DEFAULT_HEARTBEAT_WINDOW,
            liveness_grace: DEFAULT_LIVENESS_GRACE,
        }
    }
}

impl SessionConfig {
    /// Default configuration pointed at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        (self.heartbeat_window / 2).max(Duration::from_millis(1))
    }

    /// Maximum inbound silence before the socket is presumed dead
    pub fn liveness_timeout(&self) -> Duration {
        self.heartbeat_window + self.liveness_grace
    }

    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.base_backoff, self.max_backoff)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(BinanceError::Config(format!(
                "stream url must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        if self.heartbeat_window.is_zero() {
            return Err(BinanceError::Config(
                "heartbeat window must be non-zero".to_string(),
            ));
        }
        if self.base_backoff.is_zero() {
            return Err(BinanceError::Config(
                "base backoff must be non-zero".to_string(),
            ));
        }
        if self.base_backoff > self.max_backoff {
            return Err(BinanceError::Config(format!(
                "base backoff {:?} exceeds max backoff {:?}",
                self.base_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timers() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(config.liveness_timeout(), Duration::from_secs(35));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.backoff().delay(1), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_http_url() {
        let config = SessionConfig::new("https://stream.binance.com");
        assert!(matches!(config.validate(), Err(BinanceError::Config(_))));
    }

    #[test]
    fn test_rejects_unparseable_url() {
        let config = SessionConfig::new("not a url");
        assert!(matches!(config.validate(), Err(BinanceError::UrlParse(_))));
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let config = SessionConfig {
            base_backoff: Duration::from_secs(90),
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(BinanceError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_heartbeat_window() {
        let config = SessionConfig {
            heartbeat_window: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(BinanceError::Config(_))));
    }
}
