//! Referral endpoints: dashboard, apply, leaderboard.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use swiftreply_ledger::{LeaderboardRow, ReferralDashboard};

use crate::auth::CurrentAccount;
use crate::error::ApiResult;
use crate::state::AppState;

const LEADERBOARD_SIZE: i64 = 10;

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ApiResult<Json<ReferralDashboard>> {
    let dashboard = state
        .referrals
        .dashboard(&account, &state.config.referral_link_base);
    Ok(Json(dashboard))
}

#[derive(Debug, Deserialize)]
pub struct ApplyReferralRequest {
    pub referral_code: String,
}

pub async fn apply(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(req): Json<ApplyReferralRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.referrals.apply(&account, &req.referral_code).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!(
            "Referral applied! You received {} bonus AI credits. {} earned a reward too!",
            outcome.referee_bonus_credits, outcome.referrer_name
        ),
        "your_bonus_credits": outcome.referee_bonus_credits,
        "referrer_rewarded": outcome.referrer_rewarded,
    })))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    CurrentAccount(_account): CurrentAccount,
) -> ApiResult<Json<Vec<LeaderboardRow>>> {
    let rows = state.referrals.leaderboard(LEADERBOARD_SIZE).await?;
    Ok(Json(rows))
}
