//! reqwest-backed client and full-stack shots against a wiremock server
mod common;

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use quicshot::client::{Client, ClientConfig, ClientError, HttpClient, Request};
use quicshot::engine::ScenarioGun;
use quicshot::scenario::{Scenario, Step};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{ammo, postprocessor, preprocessor, MemoryAggregator};

#[tokio::test]
async fn test_send_returns_head_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Trace", "t-1")
                .set_body_string("hello"),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(&ClientConfig::default()).unwrap();
    let url = Url::parse(&format!("{}/get", server.uri())).unwrap();
    let response = client.send(Request::new(Method::GET, url)).await.unwrap();

    assert_eq!(response.head.status.as_u16(), 200);
    assert_eq!(response.head.header_str("x-trace"), Some("t-1"));
    let body = response.body.read_all().await.unwrap();
    assert_eq!(&body[..], b"hello");
}

#[tokio::test]
async fn test_drain_counts_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let client = HttpClient::new(&ClientConfig::default()).unwrap();
    let url = Url::parse(&server.uri()).unwrap();
    let response = client.send(Request::new(Method::GET, url)).await.unwrap();
    assert_eq!(response.body.drain().await.unwrap(), 4096);
}

#[tokio::test]
async fn test_timeout_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = ClientConfig {
        timeout: Some(Duration::from_millis(100)),
        ..ClientConfig::default()
    };
    let client = HttpClient::new(&config).unwrap();
    let url = Url::parse(&server.uri()).unwrap();
    let err = client.send(Request::new(Method::GET, url)).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout), "got {:?}", err);
}

#[tokio::test]
async fn test_redirects_not_followed_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&server)
        .await;

    let client = HttpClient::new(&ClientConfig::default()).unwrap();
    let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let response = client.send(Request::new(Method::GET, url)).await.unwrap();
    assert_eq!(response.head.status.as_u16(), 302);
}

#[tokio::test]
async fn test_login_scenario_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(body_string(r#"{"user":"alice"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"token": "tok-9"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("Authorization", "Bearer tok-9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p><b>alice</b></p>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&ClientConfig::default()).unwrap();
    let samples = Arc::new(MemoryAggregator::default());
    let gun = ScenarioGun::new(Arc::new(client), samples.clone())
        .with_target(Some(Url::parse(&server.uri()).unwrap()));

    let scenario = Scenario::new("login")
        .with_step(
            Step::new("auth", Method::POST, "/auth")
                .with_body(r#"{"user":"alice"}"#)
                .with_postprocessor(postprocessor(json!({"type": "var/jsonpath", "mapping": {"token": "$.data.token"}}))),
        )
        .with_step(
            Step::new("profile", Method::GET, "/profile")
                .with_preprocessor(preprocessor(&[("token", "request.auth.token")]))
                .with_header("Authorization", "Bearer {{ token }}")
                .with_postprocessor(postprocessor(json!({"type": "var/xpath", "mapping": {"name": "//b/text()"}})))
                .with_postprocessor(postprocessor(json!({"type": "assert/response", "status_code": 200}))),
        );

    gun.shoot_ammo(&ammo(scenario)).await.unwrap();

    let samples = samples.samples();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| s.proto_code == 200 && !s.is_error()));
    assert!(samples.iter().all(|s| s.request_bytes > 0 && s.response_bytes > 0));
}
