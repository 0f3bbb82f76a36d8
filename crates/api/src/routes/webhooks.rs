//! Channel webhook endpoints.
//!
//! The GET handshake echoes the provider's challenge when the verify token
//! matches. The POST delivery endpoint always acknowledges with a 2xx,
//! even for internal no-ops and failures: the provider retries
//! aggressively on non-2xx and must never learn about internal state.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use swiftreply_agent::{DenyReason, IgnoreReason, PipelineOutcome, WebhookEnvelope};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Webhook verification handshake.
pub async fn verify_channel(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let token_matches = params
        .verify_token
        .as_deref()
        .map(|presented| {
            bool::from(
                presented
                    .as_bytes()
                    .ct_eq(state.config.channel_verify_token.as_bytes()),
            )
        })
        .unwrap_or(false);

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        tracing::info!("Channel webhook verified");
        (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
    } else {
        tracing::warn!("Channel webhook verification failed");
        (StatusCode::FORBIDDEN, "verification failed").into_response()
    }
}

/// Inbound message delivery. Runs the autonomous reply pipeline.
pub async fn receive_channel(
    State(state): State<AppState>,
    body: String,
) -> Json<serde_json::Value> {
    // Malformed JSON degrades to an empty envelope, which normalizes to a
    // no-op. Never a parse error back to the provider.
    let envelope: WebhookEnvelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable webhook body, acknowledging as no-op");
            WebhookEnvelope::default()
        }
    };

    let outcome = state.pipeline.handle(&envelope).await;
    Json(outcome_body(outcome))
}

fn outcome_body(outcome: PipelineOutcome) -> serde_json::Value {
    match outcome {
        PipelineOutcome::Replied {
            customer_phone,
            customer_message,
            reply,
            credits_remaining,
        } => serde_json::json!({
            "status": "success",
            "customer_phone": customer_phone,
            "customer_message": customer_message,
            "ai_reply": reply,
            "credits_remaining": credits_remaining,
        }),
        PipelineOutcome::Ignored(IgnoreReason::UnsupportedKind(_)) => serde_json::json!({
            "status": "ok",
            "note": "only text messages are supported currently",
        }),
        PipelineOutcome::Ignored(_) | PipelineOutcome::NoTenant => {
            serde_json::json!({ "status": "ok" })
        }
        PipelineOutcome::Redelivered => serde_json::json!({
            "status": "ok",
            "note": "duplicate delivery",
        }),
        PipelineOutcome::EntitlementDenied(DenyReason::PlanIneligible) => serde_json::json!({
            "status": "ok",
            "note": "autonomous replies require a higher plan",
        }),
        PipelineOutcome::EntitlementDenied(DenyReason::NoCredits) => serde_json::json!({
            "status": "ok",
            "note": "no AI credits remaining",
        }),
        PipelineOutcome::GenerationFailed => serde_json::json!({
            "status": "error",
            "note": "reply generation failed",
        }),
        PipelineOutcome::DispatchFailed => serde_json::json!({
            "status": "error",
            "note": "reply dispatch failed",
        }),
    }
}
