//! `rewards` queries.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use crate::errors::Result;
use crate::models::{Reward, RewardStatus, RewardType};

const INSERT: &str = r#"
    INSERT INTO rewards
        (id, user_id, referral_id, confirmation_id, booking_id, reward_type, amount,
         currency, status, notes, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
"#;

fn bind_insert<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    r: &'q Reward,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&r.id)
        .bind(&r.user_id)
        .bind(&r.referral_id)
        .bind(&r.confirmation_id)
        .bind(&r.booking_id)
        .bind(r.reward_type)
        .bind(r.amount)
        .bind(&r.currency)
        .bind(r.status)
        .bind(&r.notes)
        .bind(r.created_at)
        .bind(r.updated_at)
}

pub async fn insert(exec: impl SqliteExecutor<'_>, reward: &Reward) -> Result<()> {
    bind_insert(sqlx::query(INSERT), reward).execute(exec).await?;
    Ok(())
}

/// Insert unless a reward with the same `confirmation_id` exists.
/// Returns `true` if a row was written.
pub async fn insert_once_per_confirmation(
    exec: impl SqliteExecutor<'_>,
    reward: &Reward,
) -> Result<bool> {
    let sql = format!("{INSERT} ON CONFLICT (confirmation_id) DO NOTHING");
    let rows = bind_insert(sqlx::query(&sql), reward)
        .execute(exec)
        .await?
        .rows_affected();
    Ok(rows > 0)
}

pub async fn get(exec: impl SqliteExecutor<'_>, id: &str) -> Result<Option<Reward>> {
    let row = sqlx::query_as::<_, Reward>("SELECT * FROM rewards WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row)
}

/// Every reward of a user in issue order (oldest first).
pub async fn all_for_user(exec: impl SqliteExecutor<'_>, user_id: &str) -> Result<Vec<Reward>> {
    let rows = sqlx::query_as::<_, Reward>(
        "SELECT * FROM rewards WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

pub async fn for_referral(exec: impl SqliteExecutor<'_>, referral_id: &str) -> Result<Vec<Reward>> {
    let rows = sqlx::query_as::<_, Reward>(
        "SELECT * FROM rewards WHERE referral_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )
    .bind(referral_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// A page of a user's rewards, newest first.
pub async fn history(
    exec: impl SqliteExecutor<'_>,
    user_id: &str,
    status: Option<RewardStatus>,
    reward_type: Option<RewardType>,
    limit: i64,
    skip: i64,
) -> Result<Vec<Reward>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM rewards WHERE user_id = ");
    qb.push_bind(user_id);
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(t) = reward_type {
        qb.push(" AND reward_type = ").push_bind(t);
    }
    qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(skip);

    let rows = qb.build_query_as::<Reward>().fetch_all(exec).await?;
    Ok(rows)
}

/// `pending → validated`.
pub async fn mark_validated(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Reward>> {
    let row = sqlx::query_as::<_, Reward>(
        r#"
        UPDATE rewards
        SET    status = 'validated', validated_at = ?2, updated_at = ?2
        WHERE  id = ?1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// `pending | validated → paid`.
pub async fn mark_paid(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    transaction_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Reward>> {
    let row = sqlx::query_as::<_, Reward>(
        r#"
        UPDATE rewards
        SET    status = 'paid', paid_at = ?3, transaction_id = ?2, updated_at = ?3
        WHERE  id = ?1 AND status IN ('pending', 'validated')
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(transaction_id)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// `pending | validated → cancelled`. A paid reward never matches.
pub async fn mark_cancelled(
    exec: impl SqliteExecutor<'_>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Reward>> {
    let row = sqlx::query_as::<_, Reward>(
        r#"
        UPDATE rewards
        SET    status = 'cancelled', updated_at = ?2
        WHERE  id = ?1 AND status IN ('pending', 'validated')
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}
