/*
[INPUT]:  Mock HTTP responses
[OUTPUT]: Test results for HTTP client
[POS]:    Integration tests - HTTP endpoints
[UPDATE]: When HTTP endpoints change
*/

mod common;

use binance_stream_adapter::{BinanceClient, BinanceError, ClientConfig, Credentials, RequestSigner};
use common::setup_mock_server;
use reqwest::Method;
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[test]
fn test_client_creation() {
    let _client = assert_ok!(BinanceClient::new());
    let _client = assert_ok!(BinanceClient::with_config(ClientConfig::default()));
}

#[test]
fn test_client_credentials_roundtrip() {
    let mut client = assert_ok!(BinanceClient::new());
    assert!(client.credentials().is_none());

    client.set_credentials(Credentials::new("key", "secret"));
    let stored = client.credentials().expect("credentials should be set");
    assert_eq!(stored.api_key, "key");
    assert_eq!(stored.api_secret, "secret");
}

#[tokio::test]
async fn test_ping() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(BinanceClient::with_base_url(ClientConfig::default(), &server.uri()));
    assert_ok!(client.ping().await);
}

#[tokio::test]
async fn test_rate_limit_maps_retry_after() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let client = assert_ok!(BinanceClient::with_base_url(ClientConfig::default(), &server.uri()));
    let err = client.server_time().await.unwrap_err();
    assert!(matches!(err, BinanceError::RateLimit { retry_after: 17 }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_ip_ban_maps_to_banned() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(418).insert_header("Retry-After", "120"))
        .mount(&server)
        .await;

    let client = assert_ok!(BinanceClient::with_base_url(ClientConfig::default(), &server.uri()));
    let err = client.server_time().await.unwrap_err();
    assert!(matches!(err, BinanceError::IpBanned { retry_after: 120 }));
    assert_eq!(err.retry_delay(), Some(120));
}

#[tokio::test]
async fn test_signed_call_sends_key_and_signature() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .and(query_param("omitZeroBalances", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"canTrade":true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut client =
        assert_ok!(BinanceClient::with_base_url(ClientConfig::default(), &server.uri()));
    client.set_credentials(Credentials::new("test-key", "test-secret"));

    let body: serde_json::Value = assert_ok!(
        client
            .signed_call(
                Method::GET,
                "/api/v3/account",
                &[("omitZeroBalances", "true".to_string())],
            )
            .await
    );
    assert_eq!(body["canTrade"], true);

    let requests = server.received_requests().await.expect("recording enabled");
    let query = requests[0].url.query().expect("signed query").to_string();
    let (payload, signature) = query.rsplit_once("&signature=").expect("signature last");
    assert!(payload.contains("&timestamp="));
    assert_eq!(
        signature,
        RequestSigner::new("test-secret").sign(payload).unwrap()
    );
}

#[tokio::test]
async fn test_signed_call_without_credentials_fails_fast() {
    let server = setup_mock_server().await;
    let client = assert_ok!(BinanceClient::with_base_url(ClientConfig::default(), &server.uri()));

    let result: Result<serde_json::Value, _> = client
        .signed_call(Method::GET, "/api/v3/account", &[])
        .await;
    assert!(matches!(result, Err(BinanceError::Authentication { .. })));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
