//! Integration tests for the response envelope and client configuration
//!
//! Covers the classification rules callers rely on when handling raw
//! responses, and configuration round trips through serde.

use std::collections::BTreeMap;

use nimbus_domain::{
    AuthConfig, ClientConfig, PollingConfig, RequestDescriptor, Response, SdkError,
};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Vpc {
    id: String,
    cidr: String,
}

fn headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("x-request-id".to_string(), "req-1".to_string());
    headers
}

// ============================================================================
// Response classification
// ============================================================================

/// Validates classification across success, empty and error responses.
///
/// # Test Steps
/// 1. Classify a 201 with a body, a 202 without one and a 409 problem
/// 2. Verify data is only set for the decoded success
/// 3. Confirm the conflict surfaces as an API error through `into_data`
#[test]
fn test_envelope_classification_scenarios() {
    let created = Response::<Vpc>::from_parts(
        201,
        headers(),
        br#"{"id":"vpc-1","cidr":"10.0.0.0/16"}"#.to_vec(),
    )
    .unwrap();
    assert_eq!(created.data, Some(Vpc { id: "vpc-1".into(), cidr: "10.0.0.0/16".into() }));
    assert_eq!(created.header("X-Request-Id"), Some("req-1"));
    assert!(created.error.is_none());

    let accepted = Response::<Vpc>::from_parts(202, headers(), Vec::new()).unwrap();
    assert!(accepted.is_success());
    assert!(accepted.data.is_none());

    let conflict = Response::<Vpc>::from_parts(
        409,
        headers(),
        br#"{"title":"Conflict","detail":"cidr overlaps vpc-0","code":"overlap"}"#.to_vec(),
    )
    .unwrap();
    let payload = conflict.error.clone().unwrap();
    assert_eq!(payload.extensions.get("code").and_then(|v| v.as_str()), Some("overlap"));
    match conflict.into_data() {
        Err(SdkError::Api { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "cidr overlaps vpc-0");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

/// Validates that a malformed success body is a decode error carrying the
/// raw bytes, while a malformed error body is tolerated.
#[test]
fn test_malformed_bodies() {
    let err = Response::<Vpc>::from_parts(200, headers(), b"<html>".to_vec()).unwrap_err();
    match err {
        SdkError::Decode { status, raw_body, .. } => {
            assert_eq!(status, 200);
            assert_eq!(&*raw_body, b"<html>");
        }
        other => panic!("expected decode error, got {other:?}"),
    }

    let gateway = Response::<Vpc>::from_parts(502, headers(), b"Bad Gateway".to_vec()).unwrap();
    assert!(gateway.error.is_none());
    assert_eq!(gateway.text(), "Bad Gateway");
    assert!(gateway.into_data().unwrap_err().is_retryable());
}

/// Validates the undecoded envelope keeps the raw success body.
#[test]
fn test_undecoded_envelope() {
    let raw = Response::<()>::undecoded(200, headers(), b"not json".to_vec());
    assert!(raw.data.is_none());
    assert_eq!(raw.text(), "not json");
}

// ============================================================================
// Requests and configuration
// ============================================================================

/// Validates building a JSON request descriptor.
#[test]
fn test_request_descriptor_builder() {
    let descriptor = RequestDescriptor::post("/vpcs")
        .query("dry_run", "false")
        .header("x-tenant", "acme")
        .json_body(&serde_json::json!({ "cidr": "10.0.0.0/16" }))
        .unwrap();

    assert_eq!(descriptor.query.get("dry_run").map(String::as_str), Some("false"));
    assert_eq!(descriptor.headers.get("x-tenant").map(String::as_str), Some("acme"));
    assert_eq!(descriptor.body.as_deref(), Some(br#"{"cidr":"10.0.0.0/16"}"#.as_slice()));
}

/// Validates that serialized configuration never contains the secret.
#[test]
fn test_config_serialization_omits_secret() {
    let config = ClientConfig::new(
        "https://api.example.com",
        AuthConfig::new("https://login.example.com/token", "client", "super-secret"),
    );
    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("super-secret"));
    assert!(!format!("{config:?}").contains("super-secret"));

    let restored: ClientConfig = serde_json::from_str(&json).unwrap();
    assert!(restored.auth.client_secret.is_empty());
    assert!(matches!(restored.validate(), Err(SdkError::Config(_))));
}

/// Validates polling configuration parsing from JSON.
#[test]
fn test_polling_config_from_json() {
    let config: PollingConfig = serde_json::from_str(
        r#"{
            "max_attempts": 10,
            "interval": 250,
            "success_states": ["Available"],
            "failure_states": ["Failed"]
        }"#,
    )
    .unwrap();

    assert_eq!(config.max_attempts, 10);
    assert_eq!(config.interval, std::time::Duration::from_millis(250));
    assert!(config.is_success("Available"));
    assert!(config.is_failure("Failed"));
}
