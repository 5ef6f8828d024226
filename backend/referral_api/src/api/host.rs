//! `/api/host/*`. Every route requires the host role; the engine enforces it.

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use super::{AppJson, AppPath, AppQuery, SharedState};
use crate::errors::{ApiError, Result};
use crate::models::{
    ConfirmationStatus, ConfirmationView, HostDashboard, Page, PendingConfirmation, Principal,
};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/confirmations", get(confirmations))
        .route("/confirmations/pending", get(pending))
        .route("/confirmations/:id/confirm", post(confirm))
        .route("/confirmations/:id/reject", post(reject))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmationsQuery {
    pub status: Option<ConfirmationStatus>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub rejection_reason: Option<String>,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub stats: HostDashboard,
}

#[derive(Serialize)]
pub struct ConfirmationList {
    pub confirmations: Vec<ConfirmationView>,
}

#[derive(Serialize)]
pub struct DecisionResponse {
    pub message: &'static str,
    pub confirmation: PendingConfirmation,
}

/// `GET /api/host/dashboard`
async fn dashboard(
    State(state): State<SharedState>,
    principal: Principal,
) -> Result<AppJson<DashboardResponse>> {
    let stats = state.engine.host_dashboard(&principal.user_id).await?;
    Ok(AppJson(DashboardResponse { stats }))
}

/// `GET /api/host/confirmations?status=&limit=&skip=`
async fn confirmations(
    State(state): State<SharedState>,
    principal: Principal,
    AppQuery(q): AppQuery<ConfirmationsQuery>,
) -> Result<AppJson<ConfirmationList>> {
    let confirmations = state
        .engine
        .list_host_confirmations(&principal.user_id, q.status, Page::new(q.limit, q.skip))
        .await?;
    Ok(AppJson(ConfirmationList { confirmations }))
}

/// `GET /api/host/confirmations/pending?limit=&skip=`
async fn pending(
    State(state): State<SharedState>,
    principal: Principal,
    AppQuery(q): AppQuery<PageQuery>,
) -> Result<AppJson<ConfirmationList>> {
    let confirmations = state
        .engine
        .list_pending(&principal.user_id, Page::new(q.limit, q.skip))
        .await?;
    Ok(AppJson(ConfirmationList { confirmations }))
}

/// `POST /api/host/confirmations/:id/confirm`
async fn confirm(
    State(state): State<SharedState>,
    principal: Principal,
    AppPath(id): AppPath<String>,
) -> Result<AppJson<DecisionResponse>> {
    let confirmation = state.engine.confirm(&principal.user_id, &id).await?;
    Ok(AppJson(DecisionResponse {
        message: "Referral booking confirmed successfully",
        confirmation,
    }))
}

/// `POST /api/host/confirmations/:id/reject`
///
/// The body is optional; an empty request rejects without a reason.
async fn reject(
    State(state): State<SharedState>,
    principal: Principal,
    AppPath(id): AppPath<String>,
    body: Bytes,
) -> Result<AppJson<DecisionResponse>> {
    let reason = rejection_reason(&body)?;
    let confirmation = state
        .engine
        .reject(&principal.user_id, &id, reason.as_deref())
        .await?;
    Ok(AppJson(DecisionResponse {
        message: "Referral booking rejected",
        confirmation,
    }))
}

/// Reason from an optional reject body. Only a blank body means "no body";
/// anything else must be a valid `RejectRequest`.
fn rejection_reason(body: &[u8]) -> Result<Option<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: RejectRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::invalid("body", format!("Invalid JSON body: {e}")))?;
    Ok(req.rejection_reason)
}
