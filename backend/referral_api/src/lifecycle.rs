//! Referral lifecycle engine.
//!
//! Orchestrates the referral, confirmation and reward stores:
//!
//! * link generation with a bounded unique-code retry loop
//! * public click / view tracking (atomic counters)
//! * booking reports (`active → booked` plus a pending confirmation)
//! * host confirm / reject (compare-and-set out of `pending_host_confirmation`)
//!
//! A confirm or reject moves the confirmation and its referral inside one
//! transaction. The confirmation bonus is written after commit and is keyed by
//! confirmation id, so a failed write is picked up by
//! [`ledger::reconcile_confirmation_rewards`] without risk of double issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::code;
use crate::db::{confirmations, directory, referrals};
use crate::errors::{ApiError, FieldError, Result};
use crate::guard;
use crate::ledger;
use crate::models::{
    BookingDates, ConfirmationStatus, ConfirmationView, HostDashboard, Landing,
    PendingConfirmation, Page, Referral, ReferralStats, ReferralStatus, ReportedBy,
};
use crate::validate;

/// Attempts at drawing an unused code before giving up.
pub const MAX_CODE_ATTEMPTS: u32 = 10;
/// Share of completed booking revenue paid out as referral commission.
pub const COMMISSION_RATE: f64 = 0.10;

const INVALID_CODE: &str = "Invalid referral code";

/// Produces candidate referral codes.
pub type CodeSource = Arc<dyn Fn() -> String + Send + Sync>;

/// A guest- or referrer-reported booking against a referral code.
#[derive(Debug, Clone)]
pub struct BookingReport {
    pub referral_code: String,
    pub guest_email: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub booking_confirmation: Option<String>,
    pub reported_by: ReportedBy,
}

#[derive(Debug, Clone)]
pub struct ReportedBooking {
    pub referral: Referral,
    pub confirmation: PendingConfirmation,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferralFilter {
    pub status: Option<ReferralStatus>,
    pub confirmation_status: Option<ConfirmationStatus>,
}

#[derive(Clone)]
pub struct ReferralEngine {
    pool: SqlitePool,
    default_base_url: String,
    codes: CodeSource,
}

impl ReferralEngine {
    pub fn new(pool: SqlitePool, default_base_url: impl Into<String>) -> Self {
        Self {
            pool,
            default_base_url: default_base_url.into(),
            codes: Arc::new(code::generate),
        }
    }

    /// Replace the random code generator, e.g. with a fixed sequence in tests.
    pub fn with_code_source(mut self, codes: CodeSource) -> Self {
        self.codes = codes;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─────────────────────────────────────────────────────
    // Referral side
    // ─────────────────────────────────────────────────────

    pub async fn create_referral(
        &self,
        user_id: &str,
        listing_id: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Referral> {
        let base_url =
            validate::non_empty(base_url).unwrap_or_else(|| self.default_base_url.clone());
        if !validate::is_valid_base_url(&base_url) {
            return Err(ApiError::invalid("baseUrl", "Base URL must be an absolute URL"));
        }

        let listing_id = validate::non_empty(listing_id);
        if let Some(id) = &listing_id {
            if directory::listing_host(&self.pool, id).await?.is_none() {
                return Err(ApiError::NotFound("Listing not found".to_string()));
            }
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = (self.codes)();
            if referrals::code_exists(&self.pool, &code).await? {
                continue;
            }

            let now = Utc::now();
            let referral = Referral {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                listing_id: listing_id.clone(),
                referral_link: validate::referral_link(&base_url, &code),
                referral_code: code,
                status: ReferralStatus::Active,
                click_count: 0,
                view_count: 0,
                booking_value: None,
                booking_date: None,
                check_in_date: None,
                check_out_date: None,
                created_at: now,
                updated_at: now,
            };

            match referrals::insert(&self.pool, &referral).await {
                Ok(()) => {
                    info!(
                        referral_id = %referral.id,
                        user_id,
                        code = %referral.referral_code,
                        attempt,
                        "referral created"
                    );
                    return Ok(referral);
                }
                // Lost a race for the same code between the check and the insert.
                Err(e) if e.is_unique_violation() => continue,
                Err(e) => return Err(e),
            }
        }

        error!(user_id, "referral code space exhausted");
        Err(ApiError::CodeExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }

    /// Public. Counts one click and optionally records who clicked.
    pub async fn track_click(&self, code: &str, email: Option<&str>) -> Result<Referral> {
        let code = code.trim();
        if !code::is_valid_format(code) {
            return Err(ApiError::NotFound(INVALID_CODE.to_string()));
        }

        let email = validate::non_empty(email).map(|e| e.to_lowercase());
        if let Some(email) = &email {
            if !validate::is_valid_email(email) {
                return Err(ApiError::invalid("email", "Invalid email address"));
            }
        }

        let now = Utc::now();
        let referral = referrals::increment_clicks(&self.pool, code, now)
            .await?
            .ok_or_else(|| ApiError::NotFound(INVALID_CODE.to_string()))?;

        if let Some(email) = email {
            referrals::record_email(&self.pool, &email, code, now).await?;
        }
        Ok(referral)
    }

    /// Public. Counts one view.
    pub async fn track_view(&self, code: &str) -> Result<Referral> {
        let code = code.trim();
        if !code::is_valid_format(code) {
            return Err(ApiError::NotFound(INVALID_CODE.to_string()));
        }
        referrals::increment_views(&self.pool, code, Utc::now())
            .await?
            .ok_or_else(|| ApiError::NotFound(INVALID_CODE.to_string()))
    }

    /// Landing-page data for a code. Not a pure read: every call counts a view.
    pub async fn landing(&self, code: &str) -> Result<Landing> {
        let referral = self.track_view(code).await?;
        let listing = match &referral.listing_id {
            Some(id) => directory::listing_summary(&self.pool, id).await?,
            None => None,
        };
        Ok(Landing { referral, listing })
    }

    pub async fn report_booking(&self, report: BookingReport) -> Result<ReportedBooking> {
        let guest_email = report.guest_email.trim().to_lowercase();
        let mut errors = Vec::new();
        if !validate::is_valid_email(&guest_email) {
            errors.push(FieldError::new("guestEmail", "Invalid guest email"));
        }
        if report.check_in >= report.check_out {
            errors.push(FieldError::new(
                "checkOut",
                "Check-out must be after check-in",
            ));
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        let code = report.referral_code.trim();
        if !code::is_valid_format(code) {
            return Err(ApiError::NotFound(INVALID_CODE.to_string()));
        }
        let referral = referrals::get_by_code(&self.pool, code)
            .await?
            .ok_or_else(|| ApiError::NotFound(INVALID_CODE.to_string()))?;

        if !referral.status.can_transition_to(ReferralStatus::Booked) {
            return Err(not_active_error(referral.status));
        }

        // A claim nobody can decide on would pin the referral in `booked`.
        let host_id = match &referral.listing_id {
            Some(listing_id) => directory::listing_host(&self.pool, listing_id).await?,
            None => None,
        };
        let Some(host_id) = host_id else {
            warn!(
                referral_id = %referral.id,
                "booking refused: referral has no resolvable host"
            );
            return Err(ApiError::InvalidState(
                "Referral has no listing to confirm against".to_string(),
            ));
        };

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let Some(booked) = referrals::mark_booked(
            &mut *tx,
            &referral.id,
            report.check_in,
            report.check_out,
            now,
        )
        .await?
        else {
            drop(tx);
            let current = referrals::get_by_id(&self.pool, &referral.id)
                .await?
                .map_or(referral.status, |r| r.status);
            return Err(not_active_error(current));
        };

        let confirmation = PendingConfirmation {
            id: Uuid::new_v4().to_string(),
            referral_id: booked.id.clone(),
            listing_id: booked.listing_id.clone(),
            host_id: Some(host_id),
            referral_code: booked.referral_code.clone(),
            guest_email,
            booking_confirmation: validate::non_empty(report.booking_confirmation.as_deref()),
            booking_dates: BookingDates {
                check_in: report.check_in,
                check_out: report.check_out,
            },
            reported_by: report.reported_by,
            status: ConfirmationStatus::PendingHostConfirmation,
            host_confirmed_at: None,
            host_rejected_reason: None,
            created_at: now,
            updated_at: now,
        };
        confirmations::insert(&mut *tx, &confirmation).await?;
        tx.commit().await?;

        info!(
            referral_id = %booked.id,
            confirmation_id = %confirmation.id,
            host_id = ?confirmation.host_id,
            "booking reported"
        );
        Ok(ReportedBooking {
            referral: booked,
            confirmation,
        })
    }

    /// Owner-only fetch of one referral.
    pub async fn get_referral(&self, requester: &str, referral_id: &str) -> Result<Referral> {
        let referral = referrals::get_by_id(&self.pool, referral_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Referral not found".to_string()))?;
        if referral.user_id != requester {
            return Err(ApiError::AccessDenied(
                "This referral does not belong to you".to_string(),
            ));
        }
        Ok(referral)
    }

    pub async fn user_referrals(
        &self,
        requester: &str,
        user_id: &str,
        filter: ReferralFilter,
    ) -> Result<Vec<Referral>> {
        if requester != user_id {
            return Err(ApiError::AccessDenied(
                "You can only view your own referrals".to_string(),
            ));
        }
        referrals::list_for_user(&self.pool, user_id, filter.status, filter.confirmation_status)
            .await
    }

    /// Dashboard counters. A failing aggregate yields zeros instead of an error.
    pub async fn stats(&self, user_id: &str) -> ReferralStats {
        referrals::stats_for_user(&self.pool, user_id)
            .await
            .unwrap_or_else(|e| {
                error!(user_id, "referral stats unavailable: {e}");
                ReferralStats::default()
            })
    }

    // ─────────────────────────────────────────────────────
    // Host side
    // ─────────────────────────────────────────────────────

    pub async fn list_pending(&self, host_id: &str, page: Page) -> Result<Vec<ConfirmationView>> {
        self.list_host_confirmations(
            host_id,
            Some(ConfirmationStatus::PendingHostConfirmation),
            page,
        )
        .await
    }

    pub async fn list_host_confirmations(
        &self,
        host_id: &str,
        status: Option<ConfirmationStatus>,
        page: Page,
    ) -> Result<Vec<ConfirmationView>> {
        guard::require_host(&self.pool, host_id).await?;
        confirmations::list_for_host(&self.pool, host_id, status, page.limit, page.skip).await
    }

    pub async fn host_dashboard(&self, host_id: &str) -> Result<HostDashboard> {
        guard::require_host(&self.pool, host_id).await?;

        let (total_listings, active_listings) =
            directory::listing_counts_for_host(&self.pool, host_id).await?;
        let counts = confirmations::counts_for_host(&self.pool, host_id).await?;
        let revenue = referrals::completed_revenue_for_host(&self.pool, host_id).await?;

        Ok(HostDashboard {
            total_listings,
            active_listings,
            pending_confirmations: counts.pending,
            confirmed_bookings: counts.confirmed,
            rejected_bookings: counts.rejected,
            total_revenue: round_cents(revenue),
            total_commissions_paid: round_cents(revenue * COMMISSION_RATE),
        })
    }

    /// Confirm a reported booking. The referral completes and its owner is
    /// credited the confirmation bonus.
    pub async fn confirm(&self, host_id: &str, confirmation_id: &str) -> Result<PendingConfirmation> {
        let pending = self.checked_pending(host_id, confirmation_id).await?;
        if let Some(referral) = referrals::get_by_id(&self.pool, &pending.referral_id).await? {
            if !referral.status.can_transition_to(ReferralStatus::Completed) {
                return Err(not_booked_error(referral.status));
            }
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let Some(decided) = confirmations::decide(
            &mut *tx,
            confirmation_id,
            ConfirmationStatus::HostConfirmed,
            now,
            None,
        )
        .await?
        else {
            drop(tx);
            return Err(self.not_pending(confirmation_id).await);
        };

        if !referrals::mark_completed(&mut *tx, &decided.referral_id, now).await? {
            drop(tx);
            warn!(
                confirmation_id,
                referral_id = %decided.referral_id,
                "confirm refused: referral is not booked"
            );
            let current = referrals::get_by_id(&self.pool, &decided.referral_id)
                .await?
                .map_or(ReferralStatus::Active, |r| r.status);
            return Err(not_booked_error(current));
        }
        let referral = referrals::get_by_id(&mut *tx, &decided.referral_id).await?;
        tx.commit().await?;

        info!(
            confirmation_id,
            host_id,
            referral_id = %decided.referral_id,
            "booking confirmed"
        );

        // The host's decision is durable at this point. A failed bonus write is
        // logged and left for reconciliation.
        match referral {
            Some(referral) => {
                if let Err(e) = ledger::issue_confirmation_bonus(
                    &self.pool,
                    &decided.id,
                    &referral.user_id,
                    &referral.id,
                    &referral.referral_code,
                )
                .await
                {
                    error!(
                        confirmation_id,
                        user_id = %referral.user_id,
                        "confirmation bonus not issued: {e}"
                    );
                }
            }
            None => error!(confirmation_id, "confirmed booking has no referral"),
        }

        Ok(decided)
    }

    /// Reject a reported booking. The referral returns to `active` so the link
    /// can carry a future claim.
    pub async fn reject(
        &self,
        host_id: &str,
        confirmation_id: &str,
        reason: Option<&str>,
    ) -> Result<PendingConfirmation> {
        self.checked_pending(host_id, confirmation_id).await?;

        let reason = validate::non_empty(reason);
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let Some(decided) = confirmations::decide(
            &mut *tx,
            confirmation_id,
            ConfirmationStatus::HostRejected,
            now,
            reason.as_deref(),
        )
        .await?
        else {
            drop(tx);
            return Err(self.not_pending(confirmation_id).await);
        };

        if !referrals::reopen(&mut *tx, &decided.referral_id, now).await? {
            warn!(
                confirmation_id,
                referral_id = %decided.referral_id,
                "rejected booking's referral was not booked"
            );
        }
        tx.commit().await?;

        info!(
            confirmation_id,
            host_id,
            referral_id = %decided.referral_id,
            "booking rejected"
        );
        Ok(decided)
    }

    /// Host role, existence, ownership and pending status, in that order.
    async fn checked_pending(&self, host_id: &str, confirmation_id: &str) -> Result<PendingConfirmation> {
        guard::require_host(&self.pool, host_id).await?;

        let confirmation = confirmations::get(&self.pool, confirmation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Confirmation not found".to_string()))?;

        if let Err(e) = guard::require_owner(confirmation.host_id.as_deref(), host_id, "confirmation") {
            warn!(confirmation_id, host_id, "confirmation owned by another host");
            return Err(e);
        }

        if confirmation.status.is_terminal() {
            return Err(not_pending_error(confirmation.status));
        }
        Ok(confirmation)
    }

    /// Error for a lost compare-and-set, naming the status that won.
    async fn not_pending(&self, confirmation_id: &str) -> ApiError {
        match confirmations::get(&self.pool, confirmation_id).await {
            Ok(Some(c)) => not_pending_error(c.status),
            Ok(None) => ApiError::NotFound("Confirmation not found".to_string()),
            Err(e) => e,
        }
    }
}

fn not_active_error(current: ReferralStatus) -> ApiError {
    ApiError::InvalidState(format!(
        "Referral is not active (current: {})",
        current.as_str()
    ))
}

fn not_booked_error(current: ReferralStatus) -> ApiError {
    ApiError::InvalidState(format!(
        "Referral is not in booked status (current: {})",
        current.as_str()
    ))
}

fn not_pending_error(current: ConfirmationStatus) -> ApiError {
    ApiError::InvalidState(format!(
        "Confirmation is not in pending status (current: {})",
        current.as_str()
    ))
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
