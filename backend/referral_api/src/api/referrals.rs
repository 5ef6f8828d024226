//! `/api/referrals/*`

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use super::{AppJson, AppPath, AppQuery, SharedState};
use crate::errors::{ApiError, FieldError, Result};
use crate::lifecycle::{BookingReport, ReferralFilter};
use crate::models::{
    ConfirmationStatus, Landing, PendingConfirmation, Principal, Referral, ReferralStats,
    ReferralStatus, ReportedBy,
};
use crate::validate;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/generate", post(generate))
        // Static segments win over `/:id` in axum's router.
        .route("/stats", get(stats))
        .route("/track-click", post(track_click))
        .route("/track-view", post(track_view))
        .route("/track-booking", post(track_booking))
        .route("/code/:code", get(by_code))
        .route("/user/:user_id", get(for_user))
        .route("/:id", get(by_id))
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub listing_id: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackClickRequest {
    pub referral_code: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackViewRequest {
    pub referral_code: String,
}

/// Dates arrive as strings so that a bad value is reported per field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBookingRequest {
    pub referral_code: String,
    pub guest_email: String,
    pub check_in: String,
    pub check_out: String,
    pub booking_confirmation: Option<String>,
    pub reported_by: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReferralsQuery {
    pub status: Option<ReferralStatus>,
    pub confirmation_status: Option<ConfirmationStatus>,
}

#[derive(Serialize)]
pub struct ReferralEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub referral: Referral,
}

impl ReferralEnvelope {
    fn new(referral: Referral) -> Self {
        Self { message: None, referral }
    }

    fn with_message(message: &'static str, referral: Referral) -> Self {
        Self { message: Some(message), referral }
    }
}

#[derive(Serialize)]
pub struct ReferralList {
    pub referrals: Vec<Referral>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub stats: ReferralStats,
}

#[derive(Serialize)]
pub struct LandingResponse {
    pub referral: Landing,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub message: &'static str,
    pub referral: Referral,
    pub confirmation: PendingConfirmation,
}

impl TrackBookingRequest {
    fn into_report(self) -> Result<BookingReport> {
        let mut errors = Vec::new();
        let check_in = validate::parse_booking_date(&self.check_in);
        if check_in.is_none() {
            errors.push(FieldError::new("checkIn", "Check-in must be an ISO 8601 date"));
        }
        let check_out = validate::parse_booking_date(&self.check_out);
        if check_out.is_none() {
            errors.push(FieldError::new("checkOut", "Check-out must be an ISO 8601 date"));
        }
        let reported_by = ReportedBy::parse(self.reported_by.trim());
        if reported_by.is_none() {
            errors.push(FieldError::new(
                "reportedBy",
                "reportedBy must be 'guest' or 'referrer'",
            ));
        }
        if self.referral_code.trim().is_empty() {
            errors.push(FieldError::new("referralCode", "Referral code is required"));
        }

        match (check_in, check_out, reported_by) {
            (Some(check_in), Some(check_out), Some(reported_by)) if errors.is_empty() => {
                Ok(BookingReport {
                    referral_code: self.referral_code,
                    guest_email: self.guest_email,
                    check_in,
                    check_out,
                    booking_confirmation: self.booking_confirmation,
                    reported_by,
                })
            }
            _ => Err(ApiError::Validation(errors)),
        }
    }
}

fn require_code(code: &str) -> Result<()> {
    if code.trim().is_empty() {
        return Err(ApiError::invalid("referralCode", "Referral code is required"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `POST /api/referrals/generate`
async fn generate(
    State(state): State<SharedState>,
    principal: Principal,
    AppJson(req): AppJson<GenerateRequest>,
) -> Result<(StatusCode, AppJson<ReferralEnvelope>)> {
    let referral = state
        .engine
        .create_referral(
            &principal.user_id,
            req.listing_id.as_deref(),
            req.base_url.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        AppJson(ReferralEnvelope::with_message(
            "Referral link generated successfully",
            referral,
        )),
    ))
}

/// `GET /api/referrals/stats`
async fn stats(State(state): State<SharedState>, principal: Principal) -> AppJson<StatsResponse> {
    AppJson(StatsResponse {
        stats: state.engine.stats(&principal.user_id).await,
    })
}

/// `GET /api/referrals/:id`
async fn by_id(
    State(state): State<SharedState>,
    principal: Principal,
    AppPath(id): AppPath<String>,
) -> Result<AppJson<ReferralEnvelope>> {
    let referral = state.engine.get_referral(&principal.user_id, &id).await?;
    Ok(AppJson(ReferralEnvelope::new(referral)))
}

/// `GET /api/referrals/user/:user_id`
async fn for_user(
    State(state): State<SharedState>,
    principal: Principal,
    AppPath(user_id): AppPath<String>,
    AppQuery(query): AppQuery<UserReferralsQuery>,
) -> Result<AppJson<ReferralList>> {
    let referrals = state
        .engine
        .user_referrals(
            &principal.user_id,
            &user_id,
            ReferralFilter {
                status: query.status,
                confirmation_status: query.confirmation_status,
            },
        )
        .await?;
    Ok(AppJson(ReferralList { referrals }))
}

/// `POST /api/referrals/track-click` (public)
async fn track_click(
    State(state): State<SharedState>,
    AppJson(req): AppJson<TrackClickRequest>,
) -> Result<AppJson<ReferralEnvelope>> {
    require_code(&req.referral_code)?;
    let referral = state
        .engine
        .track_click(&req.referral_code, req.email.as_deref())
        .await?;
    Ok(AppJson(ReferralEnvelope::with_message(
        "Click tracked successfully",
        referral,
    )))
}

/// `POST /api/referrals/track-view` (public)
async fn track_view(
    State(state): State<SharedState>,
    AppJson(req): AppJson<TrackViewRequest>,
) -> Result<AppJson<ReferralEnvelope>> {
    require_code(&req.referral_code)?;
    let referral = state.engine.track_view(&req.referral_code).await?;
    Ok(AppJson(ReferralEnvelope::with_message(
        "View tracked successfully",
        referral,
    )))
}

/// `GET /api/referrals/code/:code` (public)
///
/// Landing-page fetch. Counts a view on every call.
async fn by_code(
    State(state): State<SharedState>,
    AppPath(code): AppPath<String>,
) -> Result<AppJson<LandingResponse>> {
    let landing = state.engine.landing(&code).await?;
    Ok(AppJson(LandingResponse { referral: landing }))
}

/// `POST /api/referrals/track-booking`
async fn track_booking(
    State(state): State<SharedState>,
    _principal: Principal,
    AppJson(req): AppJson<TrackBookingRequest>,
) -> Result<(StatusCode, AppJson<BookingResponse>)> {
    let reported = state.engine.report_booking(req.into_report()?).await?;
    Ok((
        StatusCode::CREATED,
        AppJson(BookingResponse {
            message: "Booking tracked successfully",
            referral: reported.referral,
            confirmation: reported.confirmation,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(check_in: &str, check_out: &str, reported_by: &str) -> TrackBookingRequest {
        TrackBookingRequest {
            referral_code: "ABCD2345".into(),
            guest_email: "g@x.com".into(),
            check_in: check_in.into(),
            check_out: check_out.into(),
            booking_confirmation: None,
            reported_by: reported_by.into(),
        }
    }

    #[test]
    fn booking_request_parses_dates_and_role() {
        let report = booking("2024-06-15", "2024-06-20T10:00:00Z", "referrer")
            .into_report()
            .unwrap();
        assert_eq!(report.reported_by, ReportedBy::Referrer);
        assert!(report.check_in < report.check_out);
    }

    #[test]
    fn booking_request_reports_every_bad_field() {
        match booking("tomorrow", "2024-06-20", "host").into_report() {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["checkIn", "reportedBy"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
