//! Outbound dispatch.
//!
//! Sends the generated reply back over the originating channel. With
//! credentials configured, a rejected API call is a hard failure and the
//! caller must not debit the credit ledger. Without credentials the
//! transport degrades to logging the message and returning a mocked
//! receipt, so the rest of the pipeline and its tests run without a live
//! channel account.

use async_trait::async_trait;
use serde_json::json;

use crate::error::AgentError;

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Proof of delivery. `mocked` receipts come from the logging transport.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
    pub mocked: bool,
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<DeliveryReceipt, AgentError>;
    fn name(&self) -> &'static str;
}

/// Live channel cloud API transport.
pub struct CloudApiTransport {
    client: reqwest::Client,
    access_token: String,
    phone_number_id: String,
    api_base: String,
}

impl CloudApiTransport {
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self::with_api_base(access_token, phone_number_id, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        access_token: impl Into<String>,
        phone_number_id: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl ChannelTransport for CloudApiTransport {
    async fn send_text(&self, to: &str, body: &str) -> Result<DeliveryReceipt, AgentError> {
        let url = format!(
            "{}/{}/messages",
            self.api_base.trim_end_matches('/'),
            self.phone_number_id
        );
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": {"body": body},
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::Dispatch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(%status, detail, "Channel API rejected outbound message");
            return Err(AgentError::Dispatch(format!(
                "channel API returned {status}"
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Dispatch(format!("invalid response body: {e}")))?;
        let provider_message_id = data["messages"][0]["id"].as_str().map(|s| s.to_string());

        Ok(DeliveryReceipt {
            provider_message_id,
            mocked: false,
        })
    }

    fn name(&self) -> &'static str {
        "cloud_api"
    }
}

/// Degrade-to-log transport used when channel credentials are absent.
pub struct MockTransport;

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn send_text(&self, to: &str, body: &str) -> Result<DeliveryReceipt, AgentError> {
        tracing::info!(
            to,
            body_len = body.len(),
            "Channel credentials absent - logging outbound message instead of sending"
        );
        Ok(DeliveryReceipt {
            provider_message_id: None,
            mocked: true,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Pick the live transport when both credentials are present, otherwise the
/// logging mock.
pub fn transport_from_credentials(
    access_token: Option<String>,
    phone_number_id: Option<String>,
    api_base: Option<String>,
) -> std::sync::Arc<dyn ChannelTransport> {
    match (access_token, phone_number_id) {
        (Some(token), Some(phone_id)) if !token.is_empty() && !phone_id.is_empty() => {
            tracing::info!("Channel transport configured");
            let transport = match api_base {
                Some(base) => CloudApiTransport::with_api_base(token, phone_id, base),
                None => CloudApiTransport::new(token, phone_id),
            };
            std::sync::Arc::new(transport)
        }
        _ => {
            tracing::warn!("Channel credentials not configured - outbound messages will be logged");
            std::sync::Arc::new(MockTransport)
        }
    }
}
