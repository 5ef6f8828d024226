//! Host authorization guard.
//!
//! The role is read from the user directory on every host-scoped call rather
//! than trusted from the token, so a demoted host loses access immediately.

use sqlx::SqlitePool;
use tracing::warn;

use crate::db::directory;
use crate::errors::{ApiError, Result};
use crate::models::Role;

pub const NOT_A_HOST: &str = "User is not a host";

/// Fail with `Forbidden` unless `user_id` holds the host role.
pub async fn require_host(pool: &SqlitePool, user_id: &str) -> Result<Role> {
    match directory::role_of(pool, user_id).await? {
        Some(Role::Host) => Ok(Role::Host),
        other => {
            warn!(user_id, role = ?other, "host-only operation refused");
            Err(ApiError::Forbidden(NOT_A_HOST.to_string()))
        }
    }
}

/// Fail with `AccessDenied` unless the resource's recorded host is `host_id`.
pub fn require_owner(recorded_host: Option<&str>, host_id: &str, what: &str) -> Result<()> {
    if recorded_host == Some(host_id) {
        Ok(())
    } else {
        Err(ApiError::AccessDenied(format!("This {what} does not belong to you")))
    }
}
