/*
[INPUT]:  HTTP configuration (base URL, timeouts, API credentials)
[OUTPUT]: Configured reqwest client ready for public and signed API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::time::Duration;

use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{BinanceError, Result};
use crate::types::ApiErrorBody;

use super::signature::RequestSigner;

/// Base URL for the Binance spot REST API
pub const DEFAULT_API_URL: &str = "https://api.binance.com";

const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Appended as `recvWindow` to signed requests when set
    pub recv_window: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            recv_window: None,
        }
    }
}

/// Credentials for SIGNED endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// REST client for the Binance spot API
#[derive(Debug)]
pub struct BinanceClient {
    http_client: Client,
    base_url: Url,
    recv_window: Option<u64>,
    credentials: Option<Credentials>,
}

impl BinanceClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_base_url(config, DEFAULT_API_URL)
    }

    /// Create a client against a non-default host (testnet, mock server)
    pub fn with_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            recv_window: config.recv_window,
            credentials: None,
        })
    }

    /// Set credentials for authenticated requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Get credentials if set
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build request builder for public endpoints
    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Call a SIGNED endpoint.
    ///
    /// `params` are sent in order, followed by `recvWindow` (if configured),
    /// `timestamp` and the HMAC `signature` of everything before it.
    pub async fn signed_call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let builder = self.signed_request(method, endpoint, params, Utc::now().timestamp_millis())?;
        self.send_json(builder).await
    }

    pub(crate) fn signed_request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        timestamp: i64,
    ) -> Result<RequestBuilder> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| BinanceError::Authentication {
                message: "API key and secret are required for signed endpoints".to_string(),
            })?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            query.append_pair(key, value);
        }
        if let Some(recv_window) = self.recv_window {
            query.append_pair("recvWindow", &recv_window.to_string());
        }
        query.append_pair("timestamp", &timestamp.to_string());
        let query = query.finish();

        let signature = RequestSigner::new(credentials.api_secret.as_str()).sign(&query)?;

        let mut url = self.base_url.join(endpoint)?;
        url.set_query(Some(&format!("{query}&signature={signature}")));

        Ok(self
            .http_client
            .request(method, url)
            .header(API_KEY_HEADER, credentials.api_key.as_str()))
    }

    /// Send a request and decode the JSON body, mapping Binance error responses
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(url = %response.url().path(), %status, "api response");

        if status.is_success() {
            let body = response.text().await?;
            return Ok(serde_json::from_str(&body)?);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(retry_after, "rate limit exceeded");
                Err(BinanceError::RateLimit { retry_after })
            }
            StatusCode::IM_A_TEAPOT => {
                warn!(retry_after, "ip banned for ignoring rate limits");
                Err(BinanceError::IpBanned { retry_after })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<ApiErrorBody>(&body) {
                    Ok(ApiErrorBody { code, msg }) => Err(BinanceError::Api { code, message: msg }),
                    Err(_) => Err(BinanceError::api_error(status, body)),
                }
            }
        }
    }
}
