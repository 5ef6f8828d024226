//! `referrals` and `referral_emails` queries.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use crate::errors::Result;
use crate::models::{ConfirmationStatus, Referral, ReferralStats, ReferralStatus};

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Insert a new referral. Fails with a unique violation if the code is taken.
pub async fn insert(exec: impl SqliteExecutor<'_>, referral: &Referral) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO referrals
            (id, user_id, listing_id, referral_code, referral_link, status,
             click_count, view_count, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&referral.id)
    .bind(&referral.user_id)
    .bind(&referral.listing_id)
    .bind(&referral.referral_code)
    .bind(&referral.referral_link)
    .bind(referral.status)
    .bind(referral.click_count)
    .bind(referral.view_count)
    .bind(referral.created_at)
    .bind(referral.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Atomically bump `click_count` and return the updated row.
pub async fn increment_clicks(
    exec: impl SqliteExecutor<'_>,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Option<Referral>> {
    let row = sqlx::query_as::<_, Referral>(
        r#"
        UPDATE referrals
        SET    click_count = click_count + 1, updated_at = ?2
        WHERE  referral_code = ?1
        RETURNING *
        "#,
    )
    .bind(code)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// Atomically bump `view_count` and return the updated row.
pub async fn increment_views(
    exec: impl SqliteExecutor<'_>,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Option<Referral>> {
    let row = sqlx::query_as::<_, Referral>(
        r#"
        UPDATE referrals
        SET    view_count = view_count + 1, updated_at = ?2
        WHERE  referral_code = ?1
        RETURNING *
        "#,
    )
    .bind(code)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

pub async fn record_email(
    exec: impl SqliteExecutor<'_>,
    email: &str,
    code: &str,
    clicked_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO referral_emails (email, referral_code, clicked_at) VALUES (?1, ?2, ?3)")
        .bind(email)
        .bind(code)
        .bind(clicked_at)
        .execute(exec)
        .await?;
    Ok(())
}

/// `active → booked`, stamping the booking dates. Returns the updated row, or
/// `None` if the referral was not `active`.
pub async fn mark_booked(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<Referral>> {
    let row = sqlx::query_as::<_, Referral>(
        r#"
        UPDATE referrals
        SET    status = 'booked', booking_date = ?2, check_in_date = ?3,
               check_out_date = ?4, updated_at = ?2
        WHERE  id = ?1 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(now)
    .bind(check_in)
    .bind(check_out)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// `booked → completed`. Returns `false` if the referral was not `booked`.
pub async fn mark_completed(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE referrals
        SET    status = 'completed', booking_value = COALESCE(booking_value, 0), updated_at = ?2
        WHERE  id = ?1 AND status = 'booked'
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// `booked → active`, voiding the booking claim. Returns `false` if the
/// referral was not `booked`.
pub async fn reopen(exec: impl SqliteExecutor<'_>, id: &str, now: DateTime<Utc>) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE referrals
        SET    status = 'active', booking_date = NULL, check_in_date = NULL,
               check_out_date = NULL, updated_at = ?2
        WHERE  id = ?1 AND status = 'booked'
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn code_exists(exec: impl SqliteExecutor<'_>, code: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM referrals WHERE referral_code = ?1")
        .bind(code)
        .fetch_optional(exec)
        .await?;
    Ok(row.is_some())
}

pub async fn get_by_id(exec: impl SqliteExecutor<'_>, id: &str) -> Result<Option<Referral>> {
    let row = sqlx::query_as::<_, Referral>("SELECT * FROM referrals WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

pub async fn get_by_code(exec: impl SqliteExecutor<'_>, code: &str) -> Result<Option<Referral>> {
    let row = sqlx::query_as::<_, Referral>("SELECT * FROM referrals WHERE referral_code = ?1")
        .bind(code)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

/// A user's referrals, newest first. `confirmation_status` keeps only
/// referrals with at least one confirmation in that status.
pub async fn list_for_user(
    exec: impl SqliteExecutor<'_>,
    user_id: &str,
    status: Option<ReferralStatus>,
    confirmation_status: Option<ConfirmationStatus>,
) -> Result<Vec<Referral>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT r.* FROM referrals r WHERE r.user_id = ");
    qb.push_bind(user_id);
    if let Some(status) = status {
        qb.push(" AND r.status = ").push_bind(status);
    }
    if let Some(cs) = confirmation_status {
        qb.push(
            " AND EXISTS (SELECT 1 FROM pending_confirmations pc \
             WHERE pc.referral_id = r.id AND pc.status = ",
        )
        .push_bind(cs)
        .push(")");
    }
    qb.push(" ORDER BY r.created_at DESC, r.rowid DESC");

    let rows = qb.build_query_as::<Referral>().fetch_all(exec).await?;
    Ok(rows)
}

pub async fn stats_for_user(exec: impl SqliteExecutor<'_>, user_id: &str) -> Result<ReferralStats> {
    let stats = sqlx::query_as::<_, ReferralStats>(
        r#"
        SELECT COUNT(*)                                              AS total_referrals,
               COALESCE(SUM(CASE WHEN status = 'active'    THEN 1 ELSE 0 END), 0) AS active_referrals,
               COALESCE(SUM(CASE WHEN status = 'booked'    THEN 1 ELSE 0 END), 0) AS booked_referrals,
               COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_referrals,
               COALESCE(SUM(click_count), 0)                         AS total_clicks,
               COALESCE(SUM(view_count), 0)                          AS total_views
        FROM   referrals
        WHERE  user_id = ?1
        "#,
    )
    .bind(user_id)
    .fetch_one(exec)
    .await?;
    Ok(stats)
}

pub async fn count_completed_for_user(exec: impl SqliteExecutor<'_>, user_id: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM referrals WHERE user_id = ?1 AND status = 'completed'",
    )
    .bind(user_id)
    .fetch_one(exec)
    .await?;
    Ok(count)
}

/// Sum of `booking_value` over completed referrals on the host's listings.
pub async fn completed_revenue_for_host(
    exec: impl SqliteExecutor<'_>,
    host_id: &str,
) -> Result<f64> {
    let (total,): (f64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(r.booking_value), 0.0)
        FROM   referrals r
        JOIN   listings  l ON l.id = r.listing_id
        WHERE  l.host_id = ?1 AND r.status = 'completed'
        "#,
    )
    .bind(host_id)
    .fetch_one(exec)
    .await?;
    Ok(total)
}
