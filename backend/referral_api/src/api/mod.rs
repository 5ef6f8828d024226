//! Axum REST API: shared state, extractors and route assembly.
//!
//! Handlers are thin. They authenticate, decode the request, call the engine
//! or the ledger and wrap the result in a `{message?, <entity>}` envelope.

pub mod host;
pub mod referrals;
pub mod rewards;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::errors::ApiError;
use crate::identity::IdentityProvider;
use crate::lifecycle::ReferralEngine;
use crate::models::Principal;

#[derive(Clone)]
pub struct ApiState {
    pub engine: ReferralEngine,
    pub pool: SqlitePool,
    pub identity: Arc<dyn IdentityProvider>,
}

impl ApiState {
    pub fn new(engine: ReferralEngine, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            pool: engine.pool().clone(),
            engine,
            identity,
        }
    }
}

pub type SharedState = Arc<ApiState>;

// ─────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────

/// `Json` whose rejection is an [`ApiError`], so malformed bodies get the
/// common `{error, errors}` shape.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> IntoResponse for AppJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<SharedState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        state.identity.authenticate(token).await
    }
}

// ─────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Everything mounted under `/api`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .nest("/referrals", referrals::router())
        .nest("/host", host::router())
        .nest("/rewards", rewards::router())
}

/// Unauthenticated operational routes.
pub fn ops_router() -> Router<SharedState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(auth: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(v) = auth {
            req = req.header(AUTHORIZATION, v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }
}
