//! Application state

use std::sync::Arc;

use swiftreply_agent::{transport_from_credentials, ReplyGenerator, ReplyPipeline};
use swiftreply_ledger::ReferralLedger;
use swiftreply_shared::AccountStore;

use crate::auth::JwtManager;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn AccountStore>,
    pub jwt: JwtManager,
    pub pipeline: Arc<ReplyPipeline>,
    pub generator: ReplyGenerator,
    pub referrals: ReferralLedger,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn AccountStore>) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let generator = ReplyGenerator::from_credentials(
            config.generation_api_key.clone(),
            config.generation_api_base.clone(),
        );
        let transport = transport_from_credentials(
            config.channel_access_token.clone(),
            config.channel_phone_number_id.clone(),
            config.channel_api_base.clone(),
        );
        tracing::info!(
            backend = generator.backend_name(),
            transport = transport.name(),
            store = store.backend_name(),
            "Reply pipeline initialized"
        );

        let pipeline = Arc::new(ReplyPipeline::new(
            store.clone(),
            generator.clone(),
            transport,
        ));
        let referrals = ReferralLedger::new(store.clone());

        Self {
            config,
            store,
            jwt,
            pipeline,
            generator,
            referrals,
        }
    }
}
