//! Reference data owned by other services: users, sessions and listings.
//!
//! The referral core only needs narrow projections of these (a user's role,
//! a listing's host), so reads here select the minimum columns. Listing rows
//! can carry large image payloads; `images` is written but never read back.

use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;

use crate::errors::Result;
use crate::models::{ListingSummary, Principal, Role};

// ─────────────────────────────────────────────────────────
// Users & sessions
// ─────────────────────────────────────────────────────────

pub async fn upsert_user(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    email: &str,
    role: Role,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, role, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (id) DO UPDATE SET email = excluded.email, role = excluded.role
        "#,
    )
    .bind(id)
    .bind(email.to_lowercase())
    .bind(role)
    .bind(Utc::now())
    .execute(exec)
    .await?;
    Ok(())
}

/// Role of a user, `None` if the user is unknown.
pub async fn role_of(exec: impl SqliteExecutor<'_>, user_id: &str) -> Result<Option<Role>> {
    let row: Option<(Role,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(exec)
        .await?;
    Ok(row.map(|(role,)| role))
}

pub async fn insert_session(
    exec: impl SqliteExecutor<'_>,
    token: &str,
    user_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)")
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(exec)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: String,
    role: Role,
}

/// Resolve a live session token to its principal.
pub async fn principal_for_token(
    exec: impl SqliteExecutor<'_>,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Principal>> {
    let row = sqlx::query_as::<_, PrincipalRow>(
        r#"
        SELECT u.id, u.role
        FROM   sessions s
        JOIN   users    u ON u.id = s.user_id
        WHERE  s.token = ?1 AND (s.expires_at IS NULL OR s.expires_at > ?2)
        "#,
    )
    .bind(token)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(|r| Principal {
        user_id: r.id,
        role: r.role,
    }))
}

// ─────────────────────────────────────────────────────────
// Listings
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewListing {
    pub id: String,
    pub host_id: String,
    pub title: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub active: bool,
    pub images: Vec<String>,
}

pub async fn insert_listing(exec: impl SqliteExecutor<'_>, listing: &NewListing) -> Result<()> {
    let images = serde_json::to_string(&listing.images)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize listing images: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO listings (id, host_id, title, city, country, status, images, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&listing.id)
    .bind(&listing.host_id)
    .bind(&listing.title)
    .bind(&listing.city)
    .bind(&listing.country)
    .bind(if listing.active { "active" } else { "inactive" })
    .bind(images)
    .bind(Utc::now())
    .execute(exec)
    .await?;
    Ok(())
}

/// Owning host of a listing. Id-only read: never touches the listing body.
pub async fn listing_host(exec: impl SqliteExecutor<'_>, listing_id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT host_id FROM listings WHERE id = ?1")
        .bind(listing_id)
        .fetch_optional(exec)
        .await?;
    Ok(row.map(|(host,)| host))
}

pub async fn listing_summary(
    exec: impl SqliteExecutor<'_>,
    listing_id: &str,
) -> Result<Option<ListingSummary>> {
    let row = sqlx::query_as::<_, ListingSummary>(
        "SELECT id, title, city, country FROM listings WHERE id = ?1",
    )
    .bind(listing_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// `(total, active)` listing counts for a host.
pub async fn listing_counts_for_host(
    exec: impl SqliteExecutor<'_>,
    host_id: &str,
) -> Result<(i64, i64)> {
    let counts: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0)
        FROM   listings
        WHERE  host_id = ?1
        "#,
    )
    .bind(host_id)
    .fetch_one(exec)
    .await?;
    Ok(counts)
}
