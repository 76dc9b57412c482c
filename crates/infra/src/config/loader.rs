//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Loads a `.env` file from the working directory, if present
//! 2. Attempts to load from environment variables
//! 3. If incomplete, falls back to loading from file
//! 4. Searches multiple paths for config files
//! 5. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `NIMBUS_BASE_URL`: Base URL of the resource API (required)
//! - `NIMBUS_TOKEN_ISSUER_URL`: OAuth2 token endpoint (required)
//! - `NIMBUS_CLIENT_ID`: OAuth2 client id (required)
//! - `NIMBUS_CLIENT_SECRET`: OAuth2 client secret (required; also fills an
//!   empty secret in a config file)
//! - `NIMBUS_TOKEN_REFRESH_BUFFER_SECS`: Renew tokens this many seconds
//!   before expiry (default 300)
//! - `NIMBUS_SCOPES`: Space separated scopes
//! - `NIMBUS_HTTP_TIMEOUT_SECS`: Per-request timeout (default 30)
//! - `NIMBUS_USER_AGENT`: Overrides the `User-Agent` header
//! - `NIMBUS_TOKEN_STORE_DIR`: Persist tokens as files in this directory
//!   instead of memory
//! - `NIMBUS_TOKEN_STORE_REDIS_URL`: Persist tokens in Redis (wins over
//!   `NIMBUS_TOKEN_STORE_DIR`)
//! - `NIMBUS_TOKEN_DRIFT_SECS`: Random drift subtracted from cached expiries
//!   of the file or Redis store
//! - `NIMBUS_VAULT_SECRET_ID`: Fills an empty `auth.vault.secret_id` in a
//!   config file
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./nimbus.toml`, `./nimbus.json` (current working directory)
//! 2. `./config.toml`, `./config.json` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use nimbus_domain::{
    AuthConfig, ClientConfig, HttpConfig, Result, SdkError, TokenStoreConfig,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_REFRESH_BUFFER_SECS,
};

const CONFIG_FILE_NAMES: [&str; 4] = ["nimbus.toml", "nimbus.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables (after reading a
/// `.env` file). If any required variable is missing, falls back to loading
/// from a config file.
///
/// # Errors
/// Returns `SdkError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing or invalid
pub fn load() -> Result<ClientConfig> {
    load_dotenv();

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Read `.env` into the process environment, if one exists.
///
/// Variables already set in the environment win over the file.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!(error = %e, "Could not load .env file"),
    }
}

/// Load configuration from environment variables
///
/// The four required variables must be present; the rest fall back to
/// defaults.
///
/// # Environment Variables
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `SdkError::Config` if required variables are missing or have
/// invalid values.
pub fn load_from_env() -> Result<ClientConfig> {
    let base_url = env_var("NIMBUS_BASE_URL")?;
    let issuer_url = env_var("NIMBUS_TOKEN_ISSUER_URL")?;
    let client_id = env_var("NIMBUS_CLIENT_ID")?;
    let client_secret = env_var("NIMBUS_CLIENT_SECRET")?;

    let mut auth = AuthConfig::new(issuer_url, client_id, client_secret);
    auth.refresh_buffer_secs =
        env_parse("NIMBUS_TOKEN_REFRESH_BUFFER_SECS", DEFAULT_REFRESH_BUFFER_SECS)?;
    auth.scopes = std::env::var("NIMBUS_SCOPES")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let http = HttpConfig {
        timeout_secs: env_parse("NIMBUS_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        user_agent: std::env::var("NIMBUS_USER_AGENT").ok().filter(|s| !s.is_empty()),
    };

    let drift_secs = env_parse("NIMBUS_TOKEN_DRIFT_SECS", 0)?;
    let redis_url = std::env::var("NIMBUS_TOKEN_STORE_REDIS_URL").ok().filter(|s| !s.is_empty());
    let token_store = match (redis_url, std::env::var("NIMBUS_TOKEN_STORE_DIR")) {
        (Some(url), _) => TokenStoreConfig::Redis { url, drift_secs },
        (None, Ok(dir)) if !dir.is_empty() => {
            TokenStoreConfig::File { base_dir: PathBuf::from(dir), drift_secs }
        }
        _ => TokenStoreConfig::Memory,
    };

    let mut config = ClientConfig::new(base_url, auth);
    config.http = http;
    config.token_store = token_store;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension). An
/// empty `auth.client_secret` is filled from `NIMBUS_CLIENT_SECRET`.
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`find_config_path`].
///
/// # Errors
/// Returns `SdkError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SdkError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => find_config_path().ok_or_else(|| {
            SdkError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SdkError::Config(format!("Failed to read config file: {}", e)))?;

    let mut config = parse_config(&contents, &config_path)?;
    fill_secrets_from_env(&mut config);
    config.validate()?;
    Ok(config)
}

/// Secrets are usually kept out of config files; take them from the
/// environment when the file leaves them empty.
fn fill_secrets_from_env(config: &mut ClientConfig) {
    match config.auth.vault.as_mut() {
        Some(vault) if vault.secret_id.is_empty() => {
            if let Ok(secret_id) = std::env::var("NIMBUS_VAULT_SECRET_ID") {
                vault.secret_id = secret_id;
            }
        }
        Some(_) => {}
        None if config.auth.client_secret.is_empty() => {
            if let Ok(secret) = std::env::var("NIMBUS_CLIENT_SECRET") {
                config.auth.client_secret = secret;
            }
        }
        None => {}
    }
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `SdkError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SdkError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SdkError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SdkError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Search multiple paths for configuration files
///
/// Searches the current working directory, then the directory of the
/// running executable, for `nimbus.{toml,json}` and `config.{toml,json}`.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn find_config_path() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `SdkError::Config` if the variable is not set or empty.
fn env_var(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SdkError::Config(format!("Missing required environment variable: {}", key))),
    }
}

/// Parse an optional environment variable, using `default` when unset.
///
/// # Errors
/// Returns `SdkError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| SdkError::Config(format!("Invalid value for {}: {}", key, e))),
        _ => Ok(default),
    }
}
