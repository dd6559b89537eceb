//! Transport behaviour of `AdminClient` against a mock daemon.

mod common;

use chimera_admin::{AdminClient, AdminError, ConnectionConfig};
use common::{unused_port, MockDaemon};
use more_asserts::assert_lt;
use reqwest::Method;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::time::{Duration, Instant};

#[test]
fn test_get_version() {
    let mut daemon = MockDaemon::new();
    let mock = daemon
        .server
        .mock("GET", "/version")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"version":"0.1.0"}"#)
        .create();

    let version = daemon.client.get_version().unwrap();
    assert_eq!(version.version, "0.1.0");
    mock.assert();
}

#[test]
fn test_get_openapi_returns_document() {
    let mut daemon = MockDaemon::new();
    let _mock = daemon
        .server
        .mock("GET", "/api/openapi.json")
        .with_status(200)
        .with_body(r#"{"openapi":"3.0.0","paths":{"/version":{}}}"#)
        .create();

    let doc = daemon.client.get_openapi().unwrap();
    assert_eq!(doc["openapi"], "3.0.0");
    assert!(doc["paths"].get("/version").is_some());
}

#[test]
fn test_http_error_carries_status_and_message() {
    let mut daemon = MockDaemon::new();
    let _mock = daemon
        .server
        .mock("GET", "/api/v1/users/nonexistent_user")
        .with_status(404)
        .with_body(r#"{"error":"Not Found","message":"User does not exist"}"#)
        .create();

    let err = daemon.client.users().get("nonexistent_user").unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(err.is_not_found());
    assert!(err.to_string().contains("User does not exist"));
}

#[test]
fn test_server_error_is_not_retried() {
    let mut daemon = MockDaemon::new();
    let mock = daemon
        .server
        .mock("GET", "/api/v1/shares")
        .with_status(500)
        .with_body(r#"{"error":"Internal Server Error"}"#)
        .expect(1)
        .create();

    let err = daemon.client.shares().list().unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    mock.assert();
}

#[test]
fn test_invalid_json_is_decode_error() {
    let mut daemon = MockDaemon::new();
    let _mock = daemon
        .server
        .mock("GET", "/version")
        .with_status(200)
        .with_body("<html>definitely not json</html>")
        .create();

    let err = daemon.client.get_version().unwrap_err();
    assert!(matches!(err, AdminError::Decode(_)), "got {err:?}");
    assert_eq!(err.status_code(), None);
}

#[test]
fn test_request_no_content_ignores_body() {
    let mut daemon = MockDaemon::new();
    let mock = daemon
        .server
        .mock("DELETE", "/api/v1/exports/data")
        .with_status(204)
        .create();

    daemon
        .client
        .request_no_content(Method::DELETE, "/api/v1/exports/data", None)
        .unwrap();
    mock.assert();
}

#[test]
fn test_request_sends_json_body() {
    let mut daemon = MockDaemon::new();
    let mock = daemon
        .server
        .mock("POST", "/api/v1/buckets")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(json!({"name": "b", "path": "/b"})))
        .with_status(201)
        .with_body(r#"{"message":"Bucket created"}"#)
        .create();

    let body = json!({"name": "b", "path": "/b"});
    let response: Value = daemon
        .client
        .request(Method::POST, "/api/v1/buckets", Some(&body))
        .unwrap();
    assert_eq!(response["message"], "Bucket created");
    mock.assert();
}

#[test]
fn test_connection_refused_fails_fast() {
    let port = unused_port();
    let config = ConnectionConfig::new("127.0.0.1", port).with_timeout(Duration::from_secs(5));
    let client = AdminClient::new(config).unwrap();

    let start = Instant::now();
    let err = client.get_version().unwrap_err();

    assert!(matches!(err, AdminError::ConnectionFailed(_)), "got {err:?}");
    assert_eq!(err.status_code(), None);
    assert_lt!(start.elapsed(), Duration::from_secs(5));
}

#[test]
fn test_unresponsive_daemon_times_out() {
    // Accepted by the kernel backlog but never answered
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config =
        ConnectionConfig::new("127.0.0.1", port).with_timeout(Duration::from_millis(300));
    let client = AdminClient::new(config).unwrap();

    let start = Instant::now();
    let err = client.get_version().unwrap_err();

    assert!(matches!(err, AdminError::Timeout(_)), "got {err:?}");
    assert_eq!(err.status_code(), None);
    assert_lt!(start.elapsed(), Duration::from_secs(3));
    drop(listener);
}
