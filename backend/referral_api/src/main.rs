//! Referral API server: entry point.
//!
//! Applies migrations, schedules a one-off reconciliation of confirmation
//! bonuses in the background and serves the REST API.

use std::sync::Arc;

use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use referral_api::api::ApiState;
use referral_api::config::Config;
use referral_api::identity::{IdentityProvider, RemoteIdentity, SessionDirectory};
use referral_api::lifecycle::ReferralEngine;
use referral_api::{db, ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(
        &config.database_url,
        config.db_max_connections,
        config.store_timeout(),
    )
    .await?;

    // ─── Reward reconciliation ────────────────────────────
    let reconcile_pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = ledger::reconcile_confirmation_rewards(&reconcile_pool).await {
            error!("Reward reconciliation failed: {e}");
        }
    });

    // ─── Identity ─────────────────────────────────────────
    let identity: Arc<dyn IdentityProvider> = match &config.identity_url {
        Some(url) => {
            let client = Client::builder().timeout(config.store_timeout()).build()?;
            info!("Authenticating against remote identity service at {url}");
            Arc::new(RemoteIdentity::new(client, url))
        }
        None => {
            info!("Authenticating against the local session table");
            Arc::new(SessionDirectory::new(pool.clone()))
        }
    };

    // ─── REST API ─────────────────────────────────────────
    let engine = ReferralEngine::new(pool, config.referral_base_url.clone());
    let state = Arc::new(ApiState::new(engine, identity));
    let app = referral_api::app(state, config.request_timeout());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
