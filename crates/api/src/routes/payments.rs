//! Payment-provider webhook.
//!
//! The payment adapters themselves (checkout, subscription objects) live
//! outside this service; what arrives here are account-tier-change events.
//! Signatures use the provider's `t=<unix>,v1=<hex>` header scheme: an
//! HMAC-SHA256 of `"{timestamp}.{payload}"` under a shared secret, with a
//! five-minute timestamp tolerance against replay.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use swiftreply_shared::{PlanStatus, PlanTier};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted age of a signed payload, in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct PaymentEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: PaymentEventData,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentEventData {
    #[serde(default)]
    object: EventObject,
}

#[derive(Debug, Default, Deserialize)]
struct EventObject {
    /// Our account id, set on the checkout session at creation.
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

pub async fn payments_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    let secret = state
        .config
        .payments_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unavailable("payments webhook not configured".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing signature header".to_string()))?;

    verify_signature(
        secret,
        signature,
        &body,
        OffsetDateTime::now_utc().unix_timestamp(),
    )?;

    let event: PaymentEvent = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid event payload: {e}")))?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.kind,
        "Processing payment-provider event"
    );
    handle_event(&state, event).await?;

    Ok(Json(serde_json::json!({ "received": true })))
}

/// Verify a `t=<unix>,v1=<hex>` signature header against the payload.
fn verify_signature(
    secret: &str,
    header: &str,
    payload: &str,
    now_unix: i64,
) -> Result<(), ApiError> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<&str> = None;

    for part in header.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1]),
                _ => {}
            }
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| ApiError::BadRequest("missing signature timestamp".to_string()))?;
    let v1_signature =
        v1_signature.ok_or_else(|| ApiError::BadRequest("missing v1 signature".to_string()))?;

    if (now_unix - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            timestamp,
            now = now_unix,
            "Payment webhook timestamp outside tolerance"
        );
        return Err(ApiError::BadRequest("signature timestamp too old".to_string()));
    }

    // The secret may carry a `whsec_` prefix depending on provider tooling.
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{timestamp}.{payload}");

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| ApiError::Internal("invalid webhook secret".to_string()))?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if !bool::from(computed.as_bytes().ct_eq(v1_signature.as_bytes())) {
        tracing::warn!("Payment webhook signature mismatch");
        return Err(ApiError::BadRequest("invalid signature".to_string()));
    }

    Ok(())
}

async fn handle_event(state: &AppState, event: PaymentEvent) -> ApiResult<()> {
    let object = event.data.object;
    match event.kind.as_str() {
        "checkout.session.completed" => {
            let Some(reference) = object.client_reference_id.as_deref() else {
                tracing::warn!(event_id = %event.id, "Checkout event without client_reference_id");
                return Ok(());
            };
            let account_id = Uuid::parse_str(reference).map_err(|_| {
                ApiError::BadRequest("client_reference_id is not an account id".to_string())
            })?;
            let account = state
                .store
                .account_by_id(account_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("account {account_id}")))?;

            if let Some(customer) = object.customer.as_deref() {
                state.store.set_billing_customer(account.id, customer).await?;
            }

            let tier = object
                .metadata
                .get("tier")
                .and_then(|t| PlanTier::parse(t))
                .unwrap_or(PlanTier::Growth);
            state
                .store
                .set_plan(account.id, tier, PlanStatus::Active)
                .await?;

            tracing::info!(
                account_id = %account.id,
                tier = %tier,
                "Checkout completed, plan activated"
            );
        }
        "customer.subscription.updated" => {
            let Some(account) = account_for_customer(state, object.customer.as_deref()).await?
            else {
                return Ok(());
            };
            let status = object
                .status
                .as_deref()
                .and_then(PlanStatus::parse)
                .unwrap_or(account.status);
            state.store.set_plan(account.id, account.tier, status).await?;

            if status == PlanStatus::PastDue {
                tracing::warn!(account_id = %account.id, "Subscription is past due");
            }
            tracing::info!(
                account_id = %account.id,
                status = %status,
                "Subscription updated"
            );
        }
        "customer.subscription.deleted" => {
            let Some(account) = account_for_customer(state, object.customer.as_deref()).await?
            else {
                return Ok(());
            };
            state
                .store
                .set_plan(account.id, PlanTier::Free, PlanStatus::Canceled)
                .await?;
            tracing::info!(
                account_id = %account.id,
                "Subscription cancelled, downgraded to free tier"
            );
        }
        other => {
            // Track which events arrive unhandled; new provider events show
            // up here first.
            tracing::info!(
                event_type = %other,
                event_id = %event.id,
                "Received unhandled payment event type - no handler configured"
            );
        }
    }
    Ok(())
}

async fn account_for_customer(
    state: &AppState,
    customer: Option<&str>,
) -> ApiResult<Option<swiftreply_shared::TenantAccount>> {
    let Some(customer) = customer else {
        tracing::warn!("Subscription event without customer id");
        return Ok(None);
    };
    let account = state.store.account_by_billing_customer(customer).await?;
    if account.is_none() {
        tracing::warn!(customer, "Subscription event for unknown customer");
    }
    Ok(account)
}
