//! HttpTransport against a local mock server.

use fletch::prelude::*;
use fletch::{HttpTransport, Transport, TransportError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("fletch=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_get_with_headers() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id": 1}]"#))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new();
    let request = Request::get(format!("{}/users", server.uri())).header("X-Api-Key", "secret");

    let raw = transport
        .attempt(&request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(raw.status_code, 200);
    assert_eq!(raw.body, r#"[{"id": 1}]"#);
}

#[tokio::test]
async fn test_empty_method_is_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let request = Request::new(format!("{}/ping", server.uri()));
    let raw = HttpTransport::new()
        .attempt(&request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(raw.status_code, 204);
    assert_eq!(raw.body, "");
}

#[tokio::test]
async fn test_post_body_and_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_string(r#"{"qty": 2}"#))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
        .mount(&server)
        .await;

    let request = Request::post(format!("{}/orders", server.uri()), r#"{"qty": 2}"#);
    let raw = HttpTransport::new()
        .attempt(&request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(raw.status_code, 422);
    assert_eq!(raw.body, "invalid");
}

#[tokio::test]
async fn test_cancellation_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let request = Request::get(format!("{}/slow", server.uri()));
    let result = HttpTransport::new().attempt(&request, cancel).await;

    assert!(matches!(result, Err(TransportError::Aborted)));
}

#[tokio::test]
async fn test_client_end_to_end() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items": []}"#))
        .mount(&server)
        .await;

    let fletch = Fletch::http();
    fletch
        .configure(
            InstanceOptions::named("api")
                .base_path(format!("{}/v1", server.uri()))
                .headers(HeaderSet::new().with("Authorization", "Bearer token")),
        )
        .unwrap();

    let outcome = fletch
        .send_single(Request::get("/items").instance("api"), None)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(
        outcome.response().body.as_json(),
        Some(&serde_json::json!({"items": []}))
    );
}

#[tokio::test]
async fn test_client_resends_on_gateway_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(504))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fletch = Fletch::http();
    let outcome = fletch
        .send_single(Request::get(format!("{}/flaky", server.uri())), None)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.response().text(), Some("ok"));
}

#[tokio::test]
async fn test_connection_failure_is_unknown_error() {
    let request = Request::get("http://127.0.0.1:1/unreachable");
    let result = HttpTransport::new()
        .attempt(&request, CancellationToken::new())
        .await;

    let raw = match result {
        Err(err @ TransportError::Other(_)) => err.into_raw(),
        other => panic!("expected a transport failure, got {other:?}"),
    };
    assert_eq!(raw.status_code, 0);
    assert!(raw.body.starts_with("Unknown Error: "));
}
