//! Identity provider boundary: turns a bearer token into a [`Principal`].
//!
//! Two implementations:
//!
//! * [`SessionDirectory`] reads the local `sessions` table.
//! * [`RemoteIdentity`] asks an external identity service over HTTP.
//!
//! ## Resilience
//!
//! The remote client retries rate-limit, 5xx and network failures with
//! exponential back-off, at most [`MAX_ATTEMPTS`] times, then gives up with
//! `Upstream`. A rejected token is never retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db::directory;
use crate::errors::{ApiError, Result};
use crate::models::Principal;

pub const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 2_000;

const INVALID_TOKEN: &str = "Invalid or expired token";

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal>;
}

// ─────────────────────────────────────────────────────────
// Local sessions
// ─────────────────────────────────────────────────────────

pub struct SessionDirectory {
    pool: SqlitePool,
}

impl SessionDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for SessionDirectory {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        directory::principal_for_token(&self.pool, token, Utc::now())
            .await?
            .ok_or_else(|| ApiError::Unauthorized(INVALID_TOKEN.to_string()))
    }
}

// ─────────────────────────────────────────────────────────
// Remote identity service
// ─────────────────────────────────────────────────────────

pub struct RemoteIdentity {
    client: Client,
    verify_url: String,
}

impl RemoteIdentity {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            verify_url: verify_url(base_url),
        }
    }
}

fn verify_url(base_url: &str) -> String {
    format!("{}/sessions/verify", base_url.trim_end_matches('/'))
}

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    let ms = INITIAL_BACKOFF_MS.saturating_mul(1 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl IdentityProvider for RemoteIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        let mut last_failure = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(&self.verify_url)
                .bearer_auth(token)
                .json(&json!({ "token": token }))
                .send()
                .await;

            match response {
                Err(e) => {
                    warn!(attempt, "identity request failed: {e}");
                    last_failure = e.to_string();
                }
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(ApiError::Unauthorized(INVALID_TOKEN.to_string()));
                    }
                    if is_retryable(status) {
                        warn!(attempt, %status, "identity service unavailable");
                        last_failure = format!("identity service returned {status}");
                    } else if !status.is_success() {
                        return Err(ApiError::Upstream(format!(
                            "identity service returned {status}"
                        )));
                    } else {
                        let principal: Principal = resp.json().await?;
                        debug!(user_id = %principal.user_id, "token verified remotely");
                        return Ok(principal);
                    }
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        Err(ApiError::Upstream(last_failure))
    }
}
