//! Domain records shared by the store, the engine and the HTTP layer.
//!
//! # Status machines
//!
//! ```text
//! Referral:      active ──report──► booked ──confirm──► completed
//!                  ▲                  │
//!                  └─────reject───────┘
//!                active ──► expired
//!
//! Confirmation:  pending_host_confirmation ──► host_confirmed
//!                pending_host_confirmation ──► host_rejected
//!
//! Reward:        pending ──► validated ──► paid
//!                pending | validated ──► cancelled
//! ```
//!
//! Terminal states (`completed`, `expired`, `host_confirmed`, `host_rejected`,
//! `paid`, `cancelled`) have no outgoing edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────
// Principals
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "user")]
    Traveler,
    Host,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

// ─────────────────────────────────────────────────────────
// Referral
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReferralStatus {
    Active,
    Booked,
    Completed,
    Expired,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Booked => "booked",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `to`.
    pub fn can_transition_to(&self, to: ReferralStatus) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Booked)
                | (Self::Active, Self::Expired)
                | (Self::Booked, Self::Completed)
                | (Self::Booked, Self::Active)
                | (Self::Booked, Self::Expired)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    pub user_id: String,
    pub listing_id: Option<String>,
    pub referral_code: String,
    pub referral_link: String,
    pub status: ReferralStatus,
    pub click_count: i64,
    pub view_count: i64,
    pub booking_value: Option<f64>,
    pub booking_date: Option<DateTime<Utc>>,
    pub check_in_date: Option<DateTime<Utc>>,
    pub check_out_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters for a referrer's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total_referrals: i64,
    pub active_referrals: i64,
    pub booked_referrals: i64,
    pub completed_referrals: i64,
    pub total_clicks: i64,
    pub total_views: i64,
}

// ─────────────────────────────────────────────────────────
// Listing (reference data)
// ─────────────────────────────────────────────────────────

/// Display fields of a listing. Never carries images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub id: String,
    pub title: String,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Public landing-page payload for a referral code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Landing {
    #[serde(flatten)]
    pub referral: Referral,
    pub listing: Option<ListingSummary>,
}

// ─────────────────────────────────────────────────────────
// Pending confirmation
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    PendingHostConfirmation,
    HostConfirmed,
    HostRejected,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingHostConfirmation => "pending_host_confirmation",
            Self::HostConfirmed => "host_confirmed",
            Self::HostRejected => "host_rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingHostConfirmation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReportedBy {
    Guest,
    Referrer,
}

impl ReportedBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guest" => Some(Self::Guest),
            "referrer" => Some(Self::Referrer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDates {
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub id: String,
    pub referral_id: String,
    pub listing_id: Option<String>,
    /// Host resolved from the listing when the booking was reported. Kept even
    /// if the listing later changes hands.
    pub host_id: Option<String>,
    pub referral_code: String,
    pub guest_email: String,
    pub booking_confirmation: Option<String>,
    pub booking_dates: BookingDates,
    pub reported_by: ReportedBy,
    pub status: ConfirmationStatus,
    pub host_confirmed_at: Option<DateTime<Utc>>,
    pub host_rejected_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row shape of `pending_confirmations`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ConfirmationRow {
    pub id: String,
    pub referral_id: String,
    pub listing_id: Option<String>,
    pub host_id: Option<String>,
    pub referral_code: String,
    pub guest_email: String,
    pub booking_confirmation: Option<String>,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub reported_by: ReportedBy,
    pub status: ConfirmationStatus,
    pub host_confirmed_at: Option<DateTime<Utc>>,
    pub host_rejected_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConfirmationRow> for PendingConfirmation {
    fn from(row: ConfirmationRow) -> Self {
        PendingConfirmation {
            id: row.id,
            referral_id: row.referral_id,
            listing_id: row.listing_id,
            host_id: row.host_id,
            referral_code: row.referral_code,
            guest_email: row.guest_email,
            booking_confirmation: row.booking_confirmation,
            booking_dates: BookingDates {
                check_in: row.check_in,
                check_out: row.check_out,
            },
            reported_by: row.reported_by,
            status: row.status,
            host_confirmed_at: row.host_confirmed_at,
            host_rejected_reason: row.host_rejected_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A confirmation as shown in a host's queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationView {
    #[serde(flatten)]
    pub confirmation: PendingConfirmation,
    pub listing: Option<ListingSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDashboard {
    pub total_listings: i64,
    pub active_listings: i64,
    pub pending_confirmations: i64,
    pub confirmed_bookings: i64,
    pub rejected_bookings: i64,
    pub total_revenue: f64,
    pub total_commissions_paid: f64,
}

// ─────────────────────────────────────────────────────────
// Reward
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RewardType {
    Cash,
    FreeNight,
    Bonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RewardStatus {
    Pending,
    Validated,
    Paid,
    Cancelled,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub user_id: String,
    pub referral_id: Option<String>,
    pub confirmation_id: Option<String>,
    pub booking_id: Option<String>,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub amount: f64,
    pub currency: String,
    pub status: RewardStatus,
    pub validated_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub total_earned: f64,
    pub pending: f64,
    pub paid: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestones {
    pub completed_bookings: i64,
    pub next_milestone: i64,
    pub free_nights_earned: i64,
}

// ─────────────────────────────────────────────────────────
// Paging
// ─────────────────────────────────────────────────────────

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Offset pagination with a hard cap on page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub skip: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, skip: Option<i64>) -> Self {
        Page {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            skip: skip.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(None, None)
    }
}
