//! Direct AI endpoints.
//!
//! Unlike the webhook path, failures here propagate to the caller: the
//! user asked for the generation directly and should see the 5xx.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::auth::CurrentAccount;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CopyGenerationRequest {
    pub prompt: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_tone")]
    pub tone: String,
}

fn default_language() -> String {
    "English".to_string()
}

fn default_tone() -> String {
    "Professional".to_string()
}

pub async fn generate_copy(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(req): Json<CopyGenerationRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let content = state
        .generator
        .marketing_copy(&req.prompt, &req.language, &req.tone)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    tracing::info!(account_id = %account.id, "Marketing copy generated");
    Ok(Json(serde_json::json!({
        "status": "success",
        "content": content,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AgentChatRequest {
    pub message: String,
    pub business_context: String,
}

pub async fn agent_reply(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(req): Json<AgentChatRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !account.tier.autonomous_reply_enabled() {
        return Err(ApiError::Forbidden(
            "agent replies require the growth plan or higher".to_string(),
        ));
    }

    let reply = state
        .generator
        .agent_reply(&req.message, &req.business_context)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "agent_reply": reply,
    })))
}
