//! `/api/rewards/*`: read-only views of the caller's ledger.

use axum::{extract::State, routing::get, Router};
use serde::{Deserialize, Serialize};

use super::{AppJson, AppPath, AppQuery, SharedState};
use crate::errors::Result;
use crate::ledger::{self, HistoryFilter};
use crate::models::{Balance, Milestones, Page, Principal, Reward, RewardStatus, RewardType};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/balance", get(balance))
        .route("/history", get(history))
        .route("/milestones", get(milestones))
        .route("/:id", get(by_id))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<RewardStatus>,
    #[serde(rename = "type")]
    pub reward_type: Option<RewardType>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub balance: Balance,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub rewards: Vec<Reward>,
}

#[derive(Serialize)]
pub struct MilestonesResponse {
    pub milestones: Milestones,
}

#[derive(Serialize)]
pub struct RewardResponse {
    pub reward: Reward,
}

/// `GET /api/rewards/balance`
async fn balance(
    State(state): State<SharedState>,
    principal: Principal,
) -> Result<AppJson<BalanceResponse>> {
    let balance = ledger::balance(&state.pool, &principal.user_id).await?;
    Ok(AppJson(BalanceResponse { balance }))
}

/// `GET /api/rewards/history?status=&type=&limit=&skip=`
async fn history(
    State(state): State<SharedState>,
    principal: Principal,
    AppQuery(q): AppQuery<HistoryQuery>,
) -> Result<AppJson<HistoryResponse>> {
    let rewards = ledger::history(
        &state.pool,
        &principal.user_id,
        HistoryFilter {
            status: q.status,
            reward_type: q.reward_type,
            page: Page::new(q.limit, q.skip),
        },
    )
    .await?;
    Ok(AppJson(HistoryResponse { rewards }))
}

/// `GET /api/rewards/milestones`
async fn milestones(
    State(state): State<SharedState>,
    principal: Principal,
) -> Result<AppJson<MilestonesResponse>> {
    let milestones = ledger::milestones(&state.pool, &principal.user_id).await?;
    Ok(AppJson(MilestonesResponse { milestones }))
}

/// `GET /api/rewards/:id`
async fn by_id(
    State(state): State<SharedState>,
    principal: Principal,
    AppPath(id): AppPath<String>,
) -> Result<AppJson<RewardResponse>> {
    let reward = ledger::get_owned(&state.pool, &principal.user_id, &id).await?;
    Ok(AppJson(RewardResponse { reward }))
}
