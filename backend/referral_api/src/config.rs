//! Application configuration loaded from environment variables.

use std::time::Duration;

use crate::errors::{ApiError, Result};

/// Base used for `{base}/r/{code}` links when the caller supplies none.
pub const DEFAULT_BASE_URL: &str = "https://app.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Default base URL for generated referral links
    pub referral_base_url: String,
    /// Remote identity service; `None` means the local session table is used
    pub identity_url: Option<String>,
    /// Maximum number of pooled database connections
    pub db_max_connections: u32,
    /// Ceiling (in seconds) on waiting for a connection or a locked database
    pub store_timeout_secs: u64,
    /// Ceiling (in seconds) on a whole HTTP request
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./referrals.db".to_string()),
            api_port: parse_var("API_PORT", "3000")?,
            referral_base_url: env_var("REFERRAL_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            identity_url: env_var("IDENTITY_URL").ok().filter(|s| !s.trim().is_empty()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "5")?,
            store_timeout_secs: parse_var("STORE_TIMEOUT_SECS", "5")?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "15")?,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ApiError::Config(format!("Invalid {key}")))
}
