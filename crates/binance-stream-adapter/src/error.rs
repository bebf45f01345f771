/*
[INPUT]:  Error sources (HTTP, API, serialization, WebSocket session)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Binance stream adapter
#[derive(Error, Debug)]
pub enum BinanceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// IP address auto-banned after ignoring rate limits (HTTP 418)
    #[error("IP address banned, retry after {retry_after}s")]
    IpBanned { retry_after: u64 },

    /// Authentication failed or credentials missing
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Session socket is not open
    #[error("WebSocket not connected")]
    NotConnected,

    /// Session was closed manually or gave up reconnecting
    #[error("WebSocket session closed")]
    SessionClosed,

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection timeout
    #[error("Connection timeout after {duration}s")]
    Timeout { duration: u64 },
}

impl BinanceError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BinanceError::Http(_)
                | BinanceError::RateLimit { .. }
                | BinanceError::Timeout { .. }
                | BinanceError::WebSocket(_)
                | BinanceError::NotConnected
                | BinanceError::InvalidResponse(_)
        )
    }

    /// Get retry delay in seconds (if retryable)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            BinanceError::RateLimit { retry_after } => Some(*retry_after),
            BinanceError::IpBanned { retry_after } => Some(*retry_after),
            BinanceError::Timeout { .. } => Some(1),
            _ => None,
        }
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        BinanceError::Api {
            code: i64::from(status.as_u16()),
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BinanceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BinanceError::WebSocket(err.to_string())
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, BinanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_err = BinanceError::Timeout { duration: 30 };
        assert!(timeout_err.is_retryable());
        assert_eq!(timeout_err.retry_delay(), Some(1));

        assert!(BinanceError::NotConnected.is_retryable());
        assert!(!BinanceError::SessionClosed.is_retryable());
    }

    #[test]
    fn test_banned_is_not_retryable_but_has_delay() {
        let err = BinanceError::IpBanned { retry_after: 120 };
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay(), Some(120));
    }

    #[test]
    fn test_api_error_creation() {
        let err = BinanceError::api_error(StatusCode::BAD_REQUEST, "Invalid symbol");
        match err {
            BinanceError::Api { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "Invalid symbol");
            }
            _ => panic!("Expected Api error variant"),
        }
    }
}
