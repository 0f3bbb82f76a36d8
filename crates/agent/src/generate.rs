//! Reply generation.
//!
//! The generative backend is a capability trait so the pipeline can run
//! against the live chat-completions API or a deterministic offline
//! placeholder. Backend failures are soft: the caller halts before
//! dispatch and before any ledger debit, and no retry happens inside the
//! webhook invocation (provider redelivery is the retry mechanism).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::AgentError;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

#[async_trait]
pub trait ReplyBackend: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_message: &str)
        -> Result<String, AgentError>;
    fn name(&self) -> &'static str;
}

/// Live chat-completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api_base(api_key, DEFAULT_API_BASE)
    }

    pub fn with_api_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl ReplyBackend for OpenAiBackend {
    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, AgentError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_message},
            ],
            "temperature": 0.7,
        });

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Generation(format!(
                "backend returned {status}"
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Generation(format!("invalid response body: {e}")))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AgentError::Generation("no content in backend response".to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Placeholder backend used when no API credential is configured. Keeps
/// the pipeline operable in demo/offline mode; replies are clearly marked
/// as synthetic.
pub struct OfflineBackend;

#[async_trait]
impl ReplyBackend for OfflineBackend {
    async fn generate(
        &self,
        _system_prompt: &str,
        user_message: &str,
    ) -> Result<String, AgentError> {
        let snippet: String = user_message.chars().take(80).collect();
        Ok(format!("[offline agent] placeholder reply to: {snippet}"))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

/// Prompt assembly over a pluggable backend.
#[derive(Clone)]
pub struct ReplyGenerator {
    backend: Arc<dyn ReplyBackend>,
}

impl ReplyGenerator {
    pub fn new(backend: Arc<dyn ReplyBackend>) -> Self {
        Self { backend }
    }

    /// Pick the live backend when a credential is configured, otherwise the
    /// offline placeholder.
    pub fn from_credentials(api_key: Option<String>, api_base: Option<String>) -> Self {
        match api_key {
            Some(key) if !key.is_empty() => {
                tracing::info!("Generative backend configured");
                let backend = match api_base {
                    Some(base) => OpenAiBackend::with_api_base(key, base),
                    None => OpenAiBackend::new(key),
                };
                Self::new(Arc::new(backend))
            }
            _ => {
                tracing::warn!(
                    "No generation API key configured - replies will use the offline placeholder"
                );
                Self::new(Arc::new(OfflineBackend))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Autonomous customer-service reply from the inbound message and the
    /// tenant's business context.
    pub async fn agent_reply(
        &self,
        customer_message: &str,
        business_context: &str,
    ) -> Result<String, AgentError> {
        let system_prompt = format!(
            "You are a helpful customer service agent for a small business. \
             The business details are: {business_context}. Answer the user's \
             question accurately in a friendly tone. If you are asked to book \
             something, assume it is possible if requested. Keep it concise \
             for a messaging conversation."
        );
        self.backend.generate(&system_prompt, customer_message).await
    }

    /// Marketing copy in a requested language and tone.
    pub async fn marketing_copy(
        &self,
        prompt: &str,
        language: &str,
        tone: &str,
    ) -> Result<String, AgentError> {
        let system_prompt = format!(
            "You are an expert marketing copywriter for small businesses. \
             Write high-converting marketing text. Language: {language}. Tone: {tone}."
        );
        let user_message = format!(
            "Write a short channel marketing message for the following: {prompt}. \
             Include emojis where appropriate but keep it professional."
        );
        self.backend.generate(&system_prompt, &user_message).await
    }
}
