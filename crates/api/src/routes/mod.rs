//! HTTP routes

pub mod ai;
pub mod payments;
pub mod referrals;
pub mod webhooks;


use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/webhooks/channel",
            get(webhooks::verify_channel).post(webhooks::receive_channel),
        )
        .route("/webhooks/payments", post(payments::payments_webhook))
        .route("/ai/generate-copy", post(ai::generate_copy))
        .route("/ai/agent-reply", post(ai::agent_reply))
        .route("/referrals/dashboard", get(referrals::dashboard))
        .route("/referrals/apply", post(referrals::apply))
        .route("/referrals/leaderboard", get(referrals::leaderboard))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store_healthy = state.store.health_check().await.is_ok();
    Json(serde_json::json!({
        "status": if store_healthy { "ok" } else { "degraded" },
        "store": state.store.backend_name(),
    }))
}
