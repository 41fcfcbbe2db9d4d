//! Configuration management for the client.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use quotesync_engine::RetryPolicy;

/// Default remote listing and create endpoint.
pub const DEFAULT_REMOTE_URL: &str = "https://jsonplaceholder.typicode.com/posts";

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control API host address
    pub host: String,
    /// Control API port
    pub port: u16,
    /// Directory holding the persisted keys
    pub data_dir: PathBuf,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

/// Settings for the remote mirror adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    /// Listing and create endpoint
    pub url: String,
    /// `userId` sent with every create
    pub user_id: u64,
    /// Bound on every remote request
    pub request_timeout: Duration,
    /// Remote bodies are cut to this many characters when mapped to a category
    pub category_max_chars: usize,
}

/// Settings for the sync orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Maximum number of remote records pulled per cycle
    pub fetch_limit: usize,
    /// Period of the recurring trigger
    pub interval: Duration,
    /// Delay before the first automatic cycle
    pub initial_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REMOTE_URL.to_string(),
            user_id: 1,
            request_timeout: Duration::from_secs(10),
            category_max_chars: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_limit: 10,
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_millis(1500),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let data_dir = lookup("QUOTESYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".quotesync"));

        let remote_defaults = RemoteConfig::default();
        let remote = RemoteConfig {
            url: lookup("REMOTE_URL").unwrap_or(remote_defaults.url),
            user_id: parse_or(&lookup, "REMOTE_USER_ID", remote_defaults.user_id)?,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 10)?),
            category_max_chars: non_zero(
                "CATEGORY_MAX_CHARS",
                parse_or(
                    &lookup,
                    "CATEGORY_MAX_CHARS",
                    remote_defaults.category_max_chars,
                )?,
            )?,
        };

        let sync_defaults = SyncConfig::default();
        let interval = Duration::from_secs(non_zero(
            "SYNC_INTERVAL_SECS",
            parse_or(&lookup, "SYNC_INTERVAL_SECS", 60)?,
        )?);

        let retry = RetryPolicy::new(parse_or(
            &lookup,
            "PUSH_MAX_ATTEMPTS",
            sync_defaults.retry.max_attempts,
        )?)
        .with_initial_backoff(Duration::from_secs(parse_or(
            &lookup,
            "PUSH_BACKOFF_INITIAL_SECS",
            sync_defaults.retry.initial_backoff.as_secs(),
        )?))
        .with_max_backoff(Duration::from_secs(parse_or(
            &lookup,
            "PUSH_BACKOFF_MAX_SECS",
            sync_defaults.retry.max_backoff.as_secs(),
        )?));

        let sync = SyncConfig {
            fetch_limit: parse_or(&lookup, "FETCH_LIMIT", sync_defaults.fetch_limit)?,
            interval,
            initial_delay: Duration::from_millis(parse_or(&lookup, "INITIAL_SYNC_DELAY_MS", 1500)?),
            retry,
        };

        Ok(Self {
            host,
            port,
            data_dir,
            remote,
            sync,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn non_zero<T>(key: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialEq + Default,
{
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}
