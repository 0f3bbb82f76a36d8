//! API server configuration.
//!
//! One explicit value built from the environment at startup and passed
//! into components at construction time. Components never read ambient
//! process state, so every one of them is testable with fake credentials.

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Postgres URL. Absent means the in-memory store (demo mode).
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Shared secret echoed during the channel webhook handshake.
    pub channel_verify_token: String,
    pub channel_access_token: Option<String>,
    pub channel_phone_number_id: Option<String>,
    /// Override for the channel cloud API base URL (tests).
    pub channel_api_base: Option<String>,
    pub generation_api_key: Option<String>,
    /// Override for the generation API base URL (tests).
    pub generation_api_base: Option<String>,
    /// Shared secret for payment-provider webhook signatures.
    pub payments_webhook_secret: Option<String>,
    /// Base URL baked into shareable referral links.
    pub referral_link_base: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set - using a development-only default");
                "swiftreply-dev-secret".to_string()
            }
        };

        let channel_verify_token = env_or("CHANNEL_VERIFY_TOKEN", "swiftreply_verify_token");
        if channel_verify_token == "swiftreply_verify_token" {
            tracing::warn!("CHANNEL_VERIFY_TOKEN not set - using the development default");
        }

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8080"),
            database_url: non_empty_var("DATABASE_URL"),
            jwt_secret,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24 * 7),
            channel_verify_token,
            channel_access_token: non_empty_var("CHANNEL_ACCESS_TOKEN"),
            channel_phone_number_id: non_empty_var("CHANNEL_PHONE_NUMBER_ID"),
            channel_api_base: non_empty_var("CHANNEL_API_BASE"),
            generation_api_key: non_empty_var("GENERATION_API_KEY"),
            generation_api_base: non_empty_var("GENERATION_API_BASE"),
            payments_webhook_secret: non_empty_var("PAYMENTS_WEBHOOK_SECRET"),
            referral_link_base: env_or("REFERRAL_LINK_BASE", "https://swiftreply.example"),
            allowed_origins,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
