//! `pending_confirmations` queries.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use crate::errors::Result;
use crate::models::{
    ConfirmationRow, ConfirmationStatus, ConfirmationView, ListingSummary, PendingConfirmation,
};

pub async fn insert(exec: impl SqliteExecutor<'_>, c: &PendingConfirmation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pending_confirmations
            (id, referral_id, listing_id, host_id, referral_code, guest_email,
             booking_confirmation, check_in, check_out, reported_by, status,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&c.id)
    .bind(&c.referral_id)
    .bind(&c.listing_id)
    .bind(&c.host_id)
    .bind(&c.referral_code)
    .bind(&c.guest_email)
    .bind(&c.booking_confirmation)
    .bind(c.booking_dates.check_in)
    .bind(c.booking_dates.check_out)
    .bind(c.reported_by)
    .bind(c.status)
    .bind(c.created_at)
    .bind(c.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get(exec: impl SqliteExecutor<'_>, id: &str) -> Result<Option<PendingConfirmation>> {
    let row = sqlx::query_as::<_, ConfirmationRow>("SELECT * FROM pending_confirmations WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row.map(PendingConfirmation::from))
}

/// Move a confirmation out of `pending_host_confirmation`.
///
/// Compare-and-set on the current status: of two racing callers exactly one
/// gets `Some`, the other `None`.
pub async fn decide(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    to: ConfirmationStatus,
    decided_at: DateTime<Utc>,
    rejected_reason: Option<&str>,
) -> Result<Option<PendingConfirmation>> {
    let row = sqlx::query_as::<_, ConfirmationRow>(
        r#"
        UPDATE pending_confirmations
        SET    status = ?2, host_confirmed_at = ?3, host_rejected_reason = ?4, updated_at = ?3
        WHERE  id = ?1 AND status = 'pending_host_confirmation'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(to)
    .bind(decided_at)
    .bind(rejected_reason)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(PendingConfirmation::from))
}

#[derive(sqlx::FromRow)]
struct ViewRow {
    #[sqlx(flatten)]
    confirmation: ConfirmationRow,
    listing_title: Option<String>,
    listing_city: Option<String>,
    listing_country: Option<String>,
}

impl ViewRow {
    fn into_view(self) -> ConfirmationView {
        let listing = match (&self.confirmation.listing_id, self.listing_title) {
            (Some(id), Some(title)) => Some(ListingSummary {
                id: id.clone(),
                title,
                city: self.listing_city,
                country: self.listing_country,
            }),
            _ => None,
        };
        ConfirmationView {
            confirmation: self.confirmation.into(),
            listing,
        }
    }
}

/// A host's confirmations, newest first, with listing title/city joined in.
/// Listing images are never selected.
pub async fn list_for_host(
    exec: impl SqliteExecutor<'_>,
    host_id: &str,
    status: Option<ConfirmationStatus>,
    limit: i64,
    skip: i64,
) -> Result<Vec<ConfirmationView>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT pc.*, l.title AS listing_title, l.city AS listing_city, \
         l.country AS listing_country \
         FROM pending_confirmations pc \
         LEFT JOIN listings l ON l.id = pc.listing_id \
         WHERE pc.host_id = ",
    );
    qb.push_bind(host_id);
    if let Some(status) = status {
        qb.push(" AND pc.status = ").push_bind(status);
    }
    qb.push(" ORDER BY pc.created_at DESC, pc.rowid DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(skip);

    let rows = qb.build_query_as::<ViewRow>().fetch_all(exec).await?;
    Ok(rows.into_iter().map(ViewRow::into_view).collect())
}

/// Per-status counts of a host's confirmations.
#[derive(Debug, Default, sqlx::FromRow)]
pub struct HostCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub rejected: i64,
}

pub async fn counts_for_host(exec: impl SqliteExecutor<'_>, host_id: &str) -> Result<HostCounts> {
    let counts = sqlx::query_as::<_, HostCounts>(
        r#"
        SELECT COALESCE(SUM(CASE WHEN status = 'pending_host_confirmation' THEN 1 ELSE 0 END), 0) AS pending,
               COALESCE(SUM(CASE WHEN status = 'host_confirmed'            THEN 1 ELSE 0 END), 0) AS confirmed,
               COALESCE(SUM(CASE WHEN status = 'host_rejected'             THEN 1 ELSE 0 END), 0) AS rejected
        FROM   pending_confirmations
        WHERE  host_id = ?1
        "#,
    )
    .bind(host_id)
    .fetch_one(exec)
    .await?;
    Ok(counts)
}

pub async fn count_for_referral(exec: impl SqliteExecutor<'_>, referral_id: &str) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM pending_confirmations WHERE referral_id = ?1")
            .bind(referral_id)
            .fetch_one(exec)
            .await?;
    Ok(count)
}

/// A host-confirmed booking whose bonus reward has not been written.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnrewardedConfirmation {
    pub confirmation_id: String,
    pub referral_id: String,
    pub referral_code: String,
    pub user_id: String,
}

pub async fn confirmed_without_reward(
    exec: impl SqliteExecutor<'_>,
) -> Result<Vec<UnrewardedConfirmation>> {
    let rows = sqlx::query_as::<_, UnrewardedConfirmation>(
        r#"
        SELECT pc.id AS confirmation_id, pc.referral_id, pc.referral_code, r.user_id
        FROM   pending_confirmations pc
        JOIN   referrals r ON r.id = pc.referral_id
        LEFT JOIN rewards rw ON rw.confirmation_id = pc.id
        WHERE  pc.status = 'host_confirmed' AND rw.id IS NULL
        ORDER  BY pc.host_confirmed_at ASC
        "#,
    )
    .fetch_all(exec)
    .await?;
    Ok(rows)
}
