//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;
use std::path::PathBuf;

use nimbus_domain::{SdkError, TokenStoreConfig};
use nimbus_infra::config;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("Failed to create config file");
    file.write_all(contents.as_bytes()).expect("Failed to write config file");
    path
}

#[test]
fn test_load_config_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "nimbus.toml",
        r#"
base_url = "https://api.example.com/v1"

[auth]
issuer_url = "https://login.example.com/oauth/token"
client_id = "client-a"
client_secret = "secret-a"
refresh_buffer_secs = 120
scopes = ["compute", "network"]

[http]
timeout_secs = 10
user_agent = "acme-tool/2.0"

[headers]
x-tenant = "acme"

[token_store]
kind = "file"
base_dir = "/var/cache/nimbus"
drift_secs = 30
"#,
    );

    let config = config::load_from_file(Some(path)).expect("TOML config should load");

    assert_eq!(config.base_url, "https://api.example.com/v1");
    assert_eq!(config.auth.client_id, "client-a");
    assert_eq!(config.auth.refresh_buffer_secs, 120);
    assert_eq!(config.auth.scopes, vec!["compute", "network"]);
    assert_eq!(config.http.timeout_secs, 10);
    assert_eq!(config.http.user_agent.as_deref(), Some("acme-tool/2.0"));
    assert_eq!(config.headers.get("x-tenant").map(String::as_str), Some("acme"));
    assert_eq!(
        config.token_store,
        TokenStoreConfig::File { base_dir: PathBuf::from("/var/cache/nimbus"), drift_secs: 30 }
    );
}

#[test]
fn test_load_config_from_json_file_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "nimbus.json",
        r#"{
            "base_url": "https://api.example.com/v1",
            "auth": {
                "issuer_url": "https://login.example.com/oauth/token",
                "client_id": "client-a",
                "client_secret": "secret-a"
            }
        }"#,
    );

    let config = config::load_from_file(Some(path)).expect("JSON config should load");

    assert_eq!(config.auth.refresh_buffer_secs, nimbus_domain::DEFAULT_REFRESH_BUFFER_SECS);
    assert_eq!(config.http.timeout_secs, nimbus_domain::DEFAULT_HTTP_TIMEOUT_SECS);
    assert!(config.headers.is_empty());
    assert_eq!(config.token_store, TokenStoreConfig::Memory);
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "nimbus.json",
        r#"{
            "base_url": "ftp://api.example.com",
            "auth": {
                "issuer_url": "https://login.example.com/oauth/token",
                "client_id": "client-a",
                "client_secret": "secret-a"
            }
        }"#,
    );

    let err = config::load_from_file(Some(path)).unwrap_err();
    assert!(matches!(err, SdkError::Config(ref msg) if msg.contains("unsupported scheme")));
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "nimbus.toml", "base_url = [unterminated");

    let err = config::load_from_file(Some(path)).unwrap_err();
    assert!(matches!(err, SdkError::Config(ref msg) if msg.starts_with("Invalid TOML format")));
}

#[test]
fn test_missing_file_is_reported() {
    let err = config::load_from_file(Some(PathBuf::from("/nonexistent/nimbus.toml"))).unwrap_err();
    assert!(matches!(err, SdkError::Config(ref msg) if msg.contains("Config file not found")));
}
