//! End-to-end tests driving the router in-process.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use referral_api::api::ApiState;
use referral_api::db::{self, directory, directory::NewListing};
use referral_api::identity::SessionDirectory;
use referral_api::lifecycle::ReferralEngine;
use referral_api::models::Role;

struct TestApp {
    router: Router,
    pool: SqlitePool,
}

/// Fresh database with traveler `u1`, hosts `h1`/`h2` (each with a session
/// token equal to its id) and listing `l1` owned by `h1`.
async fn test_app() -> TestApp {
    let pool = db::connect_in_memory().await.unwrap();
    for (id, role) in [("u1", Role::Traveler), ("h1", Role::Host), ("h2", Role::Host)] {
        directory::upsert_user(&pool, id, &format!("{id}@example.com"), role)
            .await
            .unwrap();
        directory::insert_session(&pool, id, id, None).await.unwrap();
    }
    directory::insert_listing(
        &pool,
        &NewListing {
            id: "l1".into(),
            host_id: "h1".into(),
            title: "Seaside loft".into(),
            city: Some("Lisbon".into()),
            country: Some("PT".into()),
            active: true,
            images: vec!["data:image/jpeg;base64,/9j/4AAQ".into()],
        },
    )
    .await
    .unwrap();

    let engine = ReferralEngine::new(pool.clone(), "https://app.com");
    let identity = Arc::new(SessionDirectory::new(pool.clone()));
    let state = Arc::new(ApiState::new(engine, identity));
    TestApp {
        router: referral_api::app(state, Duration::from_secs(10)),
        pool,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    /// POST a raw, possibly malformed, JSON body.
    async fn post_raw(&self, uri: &str, token: &str, body: &'static str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn generate(&self) -> Value {
        let (status, body) = self
            .post("/api/referrals/generate", Some("u1"), json!({ "listingId": "l1" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["referral"].clone()
    }

    async fn report(&self, code: &str) -> (StatusCode, Value) {
        self.post(
            "/api/referrals/track-booking",
            Some("u1"),
            json!({
                "referralCode": code,
                "guestEmail": "g@x.com",
                "checkIn": "2024-06-15",
                "checkOut": "2024-06-20",
                "reportedBy": "guest",
            }),
        )
        .await
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app().await;
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = test_app().await;

    let (status, body) = app.post("/api/referrals/generate", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.get("/api/rewards/balance", Some("bogus")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn referral_to_reward_over_http() {
    let app = test_app().await;
    let referral = app.generate().await;
    let code = referral["referralCode"].as_str().unwrap().to_string();
    assert_eq!(referral["referralLink"], format!("https://app.com/r/{code}"));
    assert_eq!(referral["status"], "active");

    for _ in 0..3 {
        let (status, _) = app
            .post("/api/referrals/track-click", None, json!({ "referralCode": code }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, landing) = app.get(&format!("/api/referrals/code/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(landing["referral"]["clickCount"], 3);
    assert_eq!(landing["referral"]["viewCount"], 1);
    assert_eq!(landing["referral"]["listing"]["title"], "Seaside loft");
    assert!(landing["referral"]["listing"].get("images").is_none());

    let (status, booked) = app.report(&code).await;
    assert_eq!(status, StatusCode::CREATED, "{booked}");
    assert_eq!(booked["referral"]["status"], "booked");
    assert_eq!(booked["confirmation"]["status"], "pending_host_confirmation");
    assert_eq!(booked["confirmation"]["hostId"], "h1");
    let confirmation_id = booked["confirmation"]["id"].as_str().unwrap().to_string();

    let (status, pending) = app.get("/api/host/confirmations/pending?limit=500", Some("h1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["confirmations"].as_array().unwrap().len(), 1);
    assert_eq!(pending["confirmations"][0]["listing"]["city"], "Lisbon");

    let confirm_uri = format!("/api/host/confirmations/{confirmation_id}/confirm");
    let (status, body) = app.call(Method::POST, &confirm_uri, Some("h2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().starts_with("Access denied"));

    let (status, body) = app.call(Method::POST, &confirm_uri, Some("h1"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["confirmation"]["status"], "host_confirmed");

    let (status, body) = app.call(Method::POST, &confirm_uri, Some("h1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Confirmation is not in pending status (current: host_confirmed)"
    );

    let (_, history) = app.get("/api/rewards/history", Some("u1")).await;
    let rewards = history["rewards"].as_array().unwrap();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0]["amount"], 5.0);
    assert_eq!(rewards[0]["currency"], "POINTS");
    assert_eq!(rewards[0]["type"], "bonus");

    let reward_id = rewards[0]["id"].as_str().unwrap();
    let (status, _) = app.get(&format!("/api/rewards/{reward_id}"), Some("u1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/rewards/{reward_id}"), Some("h1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, balance) = app.get("/api/rewards/balance", Some("u1")).await;
    assert_eq!(balance["balance"]["totalEarned"], 5.0);
    assert_eq!(balance["balance"]["pending"], 5.0);

    let (_, milestones) = app.get("/api/rewards/milestones", Some("u1")).await;
    assert_eq!(milestones["milestones"]["completedBookings"], 1);
    assert_eq!(milestones["milestones"]["nextMilestone"], 5);

    let (_, stats) = app.get("/api/referrals/stats", Some("u1")).await;
    assert_eq!(stats["stats"]["completedReferrals"], 1);
    assert_eq!(stats["stats"]["totalClicks"], 3);
}

#[tokio::test]
async fn reject_with_reason_reopens_referral() {
    let app = test_app().await;
    let referral = app.generate().await;
    let code = referral["referralCode"].as_str().unwrap();
    let id = referral["id"].as_str().unwrap();

    let (_, booked) = app.report(code).await;
    let confirmation_id = booked["confirmation"]["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            &format!("/api/host/confirmations/{confirmation_id}/reject"),
            Some("h1"),
            json!({ "rejectionReason": "Guest never arrived" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["confirmation"]["status"], "host_rejected");
    assert_eq!(body["confirmation"]["hostRejectedReason"], "Guest never arrived");

    let (_, body) = app.get(&format!("/api/referrals/{id}"), Some("u1")).await;
    assert_eq!(body["referral"]["status"], "active");

    let (_, body) = app
        .get("/api/referrals/user/u1?confirmationStatus=host_rejected", Some("u1"))
        .await;
    assert_eq!(body["referrals"].as_array().unwrap().len(), 1);

    let (_, history) = app.get("/api/rewards/history", Some("u1")).await;
    assert!(history["rewards"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reversed_dates_are_a_validation_error() {
    let app = test_app().await;
    let referral = app.generate().await;

    let (status, body) = app
        .post(
            "/api/referrals/track-booking",
            Some("u1"),
            json!({
                "referralCode": referral["referralCode"],
                "guestEmail": "g@x.com",
                "checkIn": "2024-06-20",
                "checkOut": "2024-06-15",
                "reportedBy": "guest",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "checkOut");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_confirmations")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn malformed_input_uses_error_body() {
    let app = test_app().await;

    let (status, body) = app
        .post("/api/referrals/track-click", None, json!({ "email": "g@x.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");

    let (status, body) = app
        .post("/api/referrals/track-click", None, json!({ "referralCode": "NOPE2345" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid referral code");

    let (status, _) = app
        .get("/api/rewards/history?status=bogus", Some("u1"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn host_routes_refuse_travelers() {
    let app = test_app().await;

    let (status, body) = app.get("/api/host/dashboard", Some("u1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "User is not a host");

    let (status, body) = app.get("/api/host/dashboard", Some("h1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["totalListings"], 1);
    assert_eq!(body["stats"]["pendingConfirmations"], 0);
}

#[tokio::test]
async fn users_see_only_their_own_referrals() {
    let app = test_app().await;
    let referral = app.generate().await;
    let id = referral["id"].as_str().unwrap();

    let (status, _) = app.get(&format!("/api/referrals/{id}"), Some("h1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/referrals/user/u1", Some("h1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/referrals/user/u1", Some("u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["referrals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_reject_body_keeps_confirmation_pending() {
    let app = test_app().await;
    let referral = app.generate().await;
    let (_, booked) = app.report(referral["referralCode"].as_str().unwrap()).await;
    let confirmation_id = booked["confirmation"]["id"].as_str().unwrap();
    let uri = format!("/api/host/confirmations/{confirmation_id}/reject");

    let (status, body) = app
        .post_raw(&uri, "h1", r#"{"rejectionReason": "Guest never arrived""#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["errors"][0]["field"], "body");

    let (_, pending) = app.get("/api/host/confirmations/pending", Some("h1")).await;
    assert_eq!(pending["confirmations"].as_array().unwrap().len(), 1);

    // An empty body still rejects, without a reason.
    let (status, body) = app.call(Method::POST, &uri, Some("h1"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["confirmation"]["status"], "host_rejected");
    assert!(body["confirmation"]["hostRejectedReason"].is_null());
}

#[tokio::test]
async fn listing_routes_honour_query_filters() {
    let app = test_app().await;
    let referral = app.generate().await;
    app.generate().await;
    let (status, _) = app.report(referral["referralCode"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .get("/api/host/confirmations?status=pending_host_confirmation&limit=5", Some("h1"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["confirmations"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .get("/api/host/confirmations?status=host_confirmed", Some("h1"))
        .await;
    assert!(body["confirmations"].as_array().unwrap().is_empty());

    let (status, body) = app
        .get("/api/host/confirmations/pending?skip=1", Some("h1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["confirmations"].as_array().unwrap().is_empty());

    let (status, body) = app
        .get("/api/referrals/user/u1?status=booked", Some("u1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["referrals"].as_array().unwrap().len(), 1);
    assert_eq!(body["referrals"][0]["id"], referral["id"]);

    let (status, body) = app
        .get("/api/rewards/history?type=bonus&status=pending&limit=10", Some("u1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["rewards"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn report_on_a_listingless_referral_is_refused() {
    let app = test_app().await;
    let (status, body) = app
        .post("/api/referrals/generate", Some("u1"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = app
        .report(body["referral"]["referralCode"].as_str().unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Referral has no listing to confirm against");
}
