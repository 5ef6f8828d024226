//! Referral rewards backend.
//!
//! Travelers generate shareable referral links, guests report bookings made
//! through them, hosts confirm or reject those bookings and confirmed bookings
//! credit the referrer with points. Everything is served over a REST API
//! backed by SQLite.

pub mod api;
pub mod code;
pub mod config;
pub mod db;
pub mod errors;
pub mod guard;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod validate;

use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use api::SharedState;

/// Assemble the full application router: `/health` plus everything under
/// `/api`, with CORS, request tracing and a per-request time limit.
pub fn app(state: SharedState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(api::ops_router())
        .nest("/api", api::router())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
