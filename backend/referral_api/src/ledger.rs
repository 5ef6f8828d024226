//! Reward ledger: issuing rewards, balances, milestones and the settlement
//! transitions used by the payout process.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::{confirmations, referrals, rewards};
use crate::errors::{ApiError, Result};
use crate::models::{Balance, Milestones, Page, Reward, RewardStatus, RewardType};

/// Points granted to the referrer for each host-confirmed booking.
pub const CONFIRMATION_BONUS: f64 = 5.0;
pub const POINTS: &str = "POINTS";
/// Reported when a user has no rewards yet.
pub const BASELINE_CURRENCY: &str = POINTS;
/// Completed bookings per free night.
pub const MILESTONE_STEP: i64 = 5;

#[derive(Debug, Clone)]
pub struct NewReward {
    pub user_id: String,
    pub referral_id: Option<String>,
    pub booking_id: Option<String>,
    pub reward_type: RewardType,
    pub amount: f64,
    pub currency: String,
    pub notes: Option<String>,
}

fn build(new: NewReward, confirmation_id: Option<String>) -> Result<Reward> {
    if !new.amount.is_finite() || new.amount < 0.0 {
        return Err(ApiError::invalid("amount", "Reward amount must be non-negative"));
    }
    if new.currency.trim().is_empty() {
        return Err(ApiError::invalid("currency", "Currency is required"));
    }
    let now = Utc::now();
    Ok(Reward {
        id: Uuid::new_v4().to_string(),
        user_id: new.user_id,
        referral_id: new.referral_id,
        confirmation_id,
        booking_id: new.booking_id,
        reward_type: new.reward_type,
        amount: new.amount,
        currency: new.currency,
        status: RewardStatus::Pending,
        validated_at: None,
        paid_at: None,
        transaction_id: None,
        notes: new.notes,
        created_at: now,
        updated_at: now,
    })
}

/// Plain create in `pending`. No duplicate detection.
pub async fn issue_reward(pool: &SqlitePool, new: NewReward) -> Result<Reward> {
    let reward = build(new, None)?;
    rewards::insert(pool, &reward).await?;
    info!(reward_id = %reward.id, user_id = %reward.user_id, amount = reward.amount, "reward issued");
    Ok(reward)
}

/// The fixed bonus for a host-confirmed booking, keyed by confirmation id.
///
/// Returns `None` if this confirmation already produced its bonus, so callers
/// may retry freely.
pub async fn issue_confirmation_bonus(
    pool: &SqlitePool,
    confirmation_id: &str,
    user_id: &str,
    referral_id: &str,
    referral_code: &str,
) -> Result<Option<Reward>> {
    let reward = build(
        NewReward {
            user_id: user_id.to_string(),
            referral_id: Some(referral_id.to_string()),
            booking_id: None,
            reward_type: RewardType::Bonus,
            amount: CONFIRMATION_BONUS,
            currency: POINTS.to_string(),
            notes: Some(format!(
                "5 points for confirmed booking via referral {referral_code}"
            )),
        },
        Some(confirmation_id.to_string()),
    )?;

    if rewards::insert_once_per_confirmation(pool, &reward).await? {
        info!(
            reward_id = %reward.id,
            confirmation_id,
            user_id,
            "confirmation bonus issued"
        );
        Ok(Some(reward))
    } else {
        Ok(None)
    }
}

/// Issue any bonus that a confirmed booking is owed but never received.
/// Returns how many were written.
pub async fn reconcile_confirmation_rewards(pool: &SqlitePool) -> Result<usize> {
    let owed = confirmations::confirmed_without_reward(pool).await?;
    let mut issued = 0usize;
    for c in &owed {
        match issue_confirmation_bonus(
            pool,
            &c.confirmation_id,
            &c.user_id,
            &c.referral_id,
            &c.referral_code,
        )
        .await
        {
            Ok(Some(_)) => issued += 1,
            Ok(None) => {}
            Err(e) => error!(confirmation_id = %c.confirmation_id, "reward reconciliation failed: {e}"),
        }
    }
    if issued > 0 {
        info!("Reconciled {issued} missing confirmation rewards");
    }
    Ok(issued)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Aggregate a user's rewards. `rewards` must be in issue order; on a tie
/// the currency seen first wins.
pub fn summarize(rewards: &[Reward]) -> Balance {
    let mut total = 0.0;
    let mut pending = 0.0;
    let mut paid = 0.0;
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for (i, r) in rewards.iter().enumerate() {
        total += r.amount;
        match r.status {
            RewardStatus::Pending | RewardStatus::Validated => pending += r.amount,
            RewardStatus::Paid => paid += r.amount,
            RewardStatus::Cancelled => {}
        }
        counts.entry(r.currency.as_str()).or_insert((0, i)).0 += 1;
    }

    let currency = counts
        .into_iter()
        .max_by(|(_, (n_a, first_a)), (_, (n_b, first_b))| {
            n_a.cmp(n_b).then(first_b.cmp(first_a))
        })
        .map(|(c, _)| c.to_string())
        .unwrap_or_else(|| BASELINE_CURRENCY.to_string());

    Balance {
        total_earned: round_cents(total),
        pending: round_cents(pending),
        paid: round_cents(paid),
        currency,
    }
}

pub async fn balance(pool: &SqlitePool, user_id: &str) -> Result<Balance> {
    let all = rewards::all_for_user(pool, user_id).await?;
    Ok(summarize(&all))
}

pub fn milestones_for(completed_bookings: i64) -> Milestones {
    let reached = completed_bookings.max(0) / MILESTONE_STEP;
    Milestones {
        completed_bookings,
        next_milestone: (reached + 1) * MILESTONE_STEP,
        free_nights_earned: reached,
    }
}

pub async fn milestones(pool: &SqlitePool, user_id: &str) -> Result<Milestones> {
    let completed = referrals::count_completed_for_user(pool, user_id).await?;
    Ok(milestones_for(completed))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFilter {
    pub status: Option<RewardStatus>,
    pub reward_type: Option<RewardType>,
    pub page: Page,
}

pub async fn history(pool: &SqlitePool, user_id: &str, filter: HistoryFilter) -> Result<Vec<Reward>> {
    rewards::history(
        pool,
        user_id,
        filter.status,
        filter.reward_type,
        filter.page.limit,
        filter.page.skip,
    )
    .await
}

/// A reward as seen by `requester`, who must be its recipient.
pub async fn get_owned(pool: &SqlitePool, requester: &str, reward_id: &str) -> Result<Reward> {
    let reward = rewards::get(pool, reward_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Reward not found".to_string()))?;
    if reward.user_id != requester {
        return Err(ApiError::AccessDenied("This reward does not belong to you".to_string()));
    }
    Ok(reward)
}

// ─────────────────────────────────────────────────────────
// Settlement transitions
// ─────────────────────────────────────────────────────────

async fn transition_failed(pool: &SqlitePool, reward_id: &str, action: &str) -> ApiError {
    match rewards::get(pool, reward_id).await {
        Ok(Some(r)) => ApiError::InvalidState(format!(
            "Cannot {action} a reward in {} status",
            r.status.as_str()
        )),
        Ok(None) => ApiError::NotFound("Reward not found".to_string()),
        Err(e) => e,
    }
}

/// `pending → validated`.
pub async fn validate_reward(pool: &SqlitePool, reward_id: &str) -> Result<Reward> {
    match rewards::mark_validated(pool, reward_id, Utc::now()).await? {
        Some(r) => Ok(r),
        None => Err(transition_failed(pool, reward_id, "validate").await),
    }
}

/// `pending | validated → paid`.
pub async fn mark_paid(pool: &SqlitePool, reward_id: &str, transaction_id: &str) -> Result<Reward> {
    if transaction_id.trim().is_empty() {
        return Err(ApiError::invalid("transactionId", "Transaction id is required"));
    }
    match rewards::mark_paid(pool, reward_id, transaction_id, Utc::now()).await? {
        Some(r) => {
            info!(reward_id, transaction_id, "reward paid");
            Ok(r)
        }
        None => Err(transition_failed(pool, reward_id, "pay").await),
    }
}

/// `pending | validated → cancelled`. Paid rewards are final.
pub async fn cancel_reward(pool: &SqlitePool, reward_id: &str) -> Result<Reward> {
    match rewards::mark_cancelled(pool, reward_id, Utc::now()).await? {
        Some(r) => {
            info!(reward_id, "reward cancelled");
            Ok(r)
        }
        None => Err(transition_failed(pool, reward_id, "cancel").await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn reward(amount: f64, currency: &str, status: RewardStatus) -> Reward {
        let now = Utc::now();
        Reward {
            id: Uuid::new_v4().to_string(),
            user_id: "u1".into(),
            referral_id: None,
            confirmation_id: None,
            booking_id: None,
            reward_type: RewardType::Bonus,
            amount,
            currency: currency.into(),
            status,
            validated_at: None,
            paid_at: None,
            transaction_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn points(amount: f64) -> NewReward {
        NewReward {
            user_id: "u1".into(),
            referral_id: None,
            booking_id: None,
            reward_type: RewardType::Bonus,
            amount,
            currency: POINTS.into(),
            notes: None,
        }
    }

    #[test]
    fn summarize_splits_by_status() {
        let balance = summarize(&[
            reward(5.0, "POINTS", RewardStatus::Pending),
            reward(5.0, "POINTS", RewardStatus::Validated),
            reward(10.0, "POINTS", RewardStatus::Paid),
            reward(2.5, "POINTS", RewardStatus::Cancelled),
        ]);
        assert_eq!(balance.total_earned, 22.5);
        assert_eq!(balance.pending, 10.0);
        assert_eq!(balance.paid, 10.0);
        assert_eq!(balance.currency, "POINTS");
    }

    #[test]
    fn summarize_picks_most_frequent_currency() {
        let balance = summarize(&[
            reward(1.0, "USD", RewardStatus::Pending),
            reward(1.0, "POINTS", RewardStatus::Pending),
            reward(1.0, "POINTS", RewardStatus::Pending),
        ]);
        assert_eq!(balance.currency, "POINTS");
    }

    #[test]
    fn summarize_tie_goes_to_first_seen() {
        let balance = summarize(&[
            reward(1.0, "USD", RewardStatus::Pending),
            reward(1.0, "POINTS", RewardStatus::Pending),
            reward(1.0, "EUR", RewardStatus::Pending),
            reward(1.0, "POINTS", RewardStatus::Pending),
            reward(1.0, "USD", RewardStatus::Pending),
        ]);
        assert_eq!(balance.currency, "USD");
    }

    #[test]
    fn empty_balance_uses_baseline() {
        let balance = summarize(&[]);
        assert_eq!(balance.total_earned, 0.0);
        assert_eq!(balance.currency, BASELINE_CURRENCY);
    }

    #[test]
    fn summarize_rounds_to_cents() {
        let balance = summarize(&[
            reward(0.1, "USD", RewardStatus::Pending),
            reward(0.2, "USD", RewardStatus::Pending),
        ]);
        assert_eq!(balance.total_earned, 0.3);
    }

    #[test]
    fn milestone_math() {
        assert_eq!(
            milestones_for(0),
            Milestones { completed_bookings: 0, next_milestone: 5, free_nights_earned: 0 }
        );
        assert_eq!(
            milestones_for(4),
            Milestones { completed_bookings: 4, next_milestone: 5, free_nights_earned: 0 }
        );
        assert_eq!(
            milestones_for(5),
            Milestones { completed_bookings: 5, next_milestone: 10, free_nights_earned: 1 }
        );
        assert_eq!(
            milestones_for(12),
            Milestones { completed_bookings: 12, next_milestone: 15, free_nights_earned: 2 }
        );
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let pool = db::connect_in_memory().await.unwrap();
        let err = issue_reward(&pool, points(-1.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn confirmation_bonus_is_issued_once() {
        let pool = db::connect_in_memory().await.unwrap();

        let first = issue_confirmation_bonus(&pool, "c1", "u1", "ref1", "ABCD2345")
            .await
            .unwrap()
            .expect("first issue writes");
        assert_eq!(first.amount, CONFIRMATION_BONUS);
        assert_eq!(first.currency, "POINTS");
        assert_eq!(first.reward_type, RewardType::Bonus);
        assert_eq!(
            first.notes.as_deref(),
            Some("5 points for confirmed booking via referral ABCD2345")
        );

        let again = issue_confirmation_bonus(&pool, "c1", "u1", "ref1", "ABCD2345")
            .await
            .unwrap();
        assert!(again.is_none());

        assert_eq!(rewards::for_referral(&pool, "ref1").await.unwrap().len(), 1);
        assert_eq!(balance(&pool, "u1").await.unwrap().total_earned, 5.0);
    }

    #[tokio::test]
    async fn settlement_path_and_paid_is_final() {
        let pool = db::connect_in_memory().await.unwrap();
        let r = issue_reward(&pool, points(5.0)).await.unwrap();

        let r = validate_reward(&pool, &r.id).await.unwrap();
        assert_eq!(r.status, RewardStatus::Validated);
        assert!(r.validated_at.is_some());

        let err = validate_reward(&pool, &r.id).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));

        let r = mark_paid(&pool, &r.id, "tx-1").await.unwrap();
        assert_eq!(r.status, RewardStatus::Paid);
        assert_eq!(r.transaction_id.as_deref(), Some("tx-1"));

        let err = cancel_reward(&pool, &r.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel a reward in paid status");
        assert_eq!(rewards::get(&pool, &r.id).await.unwrap().unwrap().status, RewardStatus::Paid);

        let b = balance(&pool, "u1").await.unwrap();
        assert_eq!(b.paid, 5.0);
        assert_eq!(b.pending, 0.0);
    }

    #[tokio::test]
    async fn cancel_pending_reward() {
        let pool = db::connect_in_memory().await.unwrap();
        let r = issue_reward(&pool, points(5.0)).await.unwrap();
        let r = cancel_reward(&pool, &r.id).await.unwrap();
        assert_eq!(r.status, RewardStatus::Cancelled);

        let err = mark_paid(&pool, &r.id, "tx-2").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));

        let err = cancel_reward(&pool, "missing").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn history_filters_and_owner_check() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = issue_reward(&pool, points(5.0)).await.unwrap();
        let _b = issue_reward(
            &pool,
            NewReward { reward_type: RewardType::Cash, currency: "USD".into(), ..points(12.0) },
        )
        .await
        .unwrap();
        validate_reward(&pool, &a.id).await.unwrap();

        let all = history(&pool, "u1", HistoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let cash = history(
            &pool,
            "u1",
            HistoryFilter { reward_type: Some(RewardType::Cash), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].currency, "USD");

        let validated = history(
            &pool,
            "u1",
            HistoryFilter { status: Some(RewardStatus::Validated), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].id, a.id);

        assert!(get_owned(&pool, "u1", &a.id).await.is_ok());
        assert!(matches!(
            get_owned(&pool, "u2", &a.id).await,
            Err(ApiError::AccessDenied(_))
        ));
        assert!(matches!(
            get_owned(&pool, "u1", "nope").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
