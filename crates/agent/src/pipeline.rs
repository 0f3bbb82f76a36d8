//! The autonomous reply pipeline.
//!
//! normalize -> resolve -> entitle -> generate -> dispatch -> debit.
//!
//! A failure at any gate short-circuits before the next stage, and the
//! ledger debit happens only after a successful dispatch. Each webhook
//! invocation is an independent task; no ordering is guaranteed between
//! messages, and the only shared mutable resource is the account's credit
//! balance, which the store mutates under per-account mutual exclusion.

use std::sync::Arc;

use swiftreply_ledger::{CreditLedger, CreditReason, LedgerError};
use swiftreply_shared::AccountStore;

use crate::dedupe::RedeliveryWindow;
use crate::dispatch::ChannelTransport;
use crate::entitlement::{self, Decision, DenyReason};
use crate::envelope::{normalize, IgnoreReason, Normalized, WebhookEnvelope};
use crate::generate::ReplyGenerator;
use crate::resolver::TenantResolver;

/// Provider message ids remembered for redelivery detection.
const REDELIVERY_WINDOW_CAPACITY: usize = 65_536;

/// Where one webhook invocation stopped. Every variant maps to a 2xx at
/// the webhook surface; the provider must never see an internal failure.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Reply generated, dispatched, and debited.
    Replied {
        customer_phone: String,
        customer_message: String,
        reply: String,
        credits_remaining: i64,
    },
    /// Nothing to process in the envelope.
    Ignored(IgnoreReason),
    /// Provider redelivered a message id we already processed.
    Redelivered,
    /// No tenant owns the destination and no active fallback exists.
    NoTenant,
    /// Plan or balance gate denied the reply.
    EntitlementDenied(DenyReason),
    /// Generative backend failed; no dispatch, no debit.
    GenerationFailed,
    /// Channel rejected the send; no debit.
    DispatchFailed,
}

pub struct ReplyPipeline {
    resolver: TenantResolver,
    generator: ReplyGenerator,
    transport: Arc<dyn ChannelTransport>,
    credits: CreditLedger,
    redelivery: RedeliveryWindow,
}

impl ReplyPipeline {
    pub fn new(
        store: Arc<dyn AccountStore>,
        generator: ReplyGenerator,
        transport: Arc<dyn ChannelTransport>,
    ) -> Self {
        Self {
            resolver: TenantResolver::new(store.clone()),
            generator,
            transport,
            credits: CreditLedger::new(store),
            redelivery: RedeliveryWindow::new(REDELIVERY_WINDOW_CAPACITY),
        }
    }

    pub async fn handle(&self, envelope: &WebhookEnvelope) -> PipelineOutcome {
        let message = match normalize(envelope) {
            Normalized::Message(message) => message,
            Normalized::Ignored(reason) => {
                tracing::debug!(?reason, "Webhook envelope ignored");
                return PipelineOutcome::Ignored(reason);
            }
        };

        if !self.redelivery.claim(&message.provider_message_id).await {
            tracing::info!(
                provider_message_id = %message.provider_message_id,
                "Duplicate webhook delivery dropped"
            );
            return PipelineOutcome::Redelivered;
        }

        tracing::info!(
            sender = %message.sender,
            destination = %message.destination,
            "Incoming channel message"
        );

        let account = match self.resolver.resolve(&message.destination).await {
            Ok(Some(account)) => account,
            Ok(None) => return PipelineOutcome::NoTenant,
            Err(e) => {
                tracing::error!(error = %e, "Tenant resolution failed");
                return PipelineOutcome::NoTenant;
            }
        };

        match entitlement::check(&account) {
            Decision::Allowed => {}
            Decision::Denied(reason) => {
                tracing::info!(
                    account_id = %account.id,
                    tier = %account.tier,
                    reason = reason.as_str(),
                    "Autonomous reply denied"
                );
                return PipelineOutcome::EntitlementDenied(reason);
            }
        }

        let business_context = account.business_context.clone().unwrap_or_else(|| {
            format!(
                "Business: {}. Please assist the customer.",
                account.company_name.as_deref().unwrap_or("unknown")
            )
        });

        let reply = match self
            .generator
            .agent_reply(&message.body, &business_context)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(account_id = %account.id, error = %e, "Reply generation failed");
                return PipelineOutcome::GenerationFailed;
            }
        };

        if let Err(e) = self.transport.send_text(&message.sender, &reply).await {
            tracing::error!(account_id = %account.id, error = %e, "Reply dispatch failed");
            return PipelineOutcome::DispatchFailed;
        }

        let credits_remaining = match self
            .credits
            .debit(account.id, 1, CreditReason::AiReplySent)
            .await
        {
            Ok(balance) => balance,
            Err(LedgerError::InsufficientCredits { balance, .. }) => {
                // Lost a race: another invocation consumed the last credit
                // between our gate check and this debit. The reply already
                // went out; the balance floor held.
                tracing::warn!(
                    account_id = %account.id,
                    "Reply dispatched but balance raced to zero before debit"
                );
                balance
            }
            Err(e) => {
                tracing::error!(account_id = %account.id, error = %e, "Post-dispatch debit failed");
                account.ai_credits_remaining
            }
        };

        tracing::info!(
            account_id = %account.id,
            customer = %message.sender,
            credits_remaining,
            "Autonomous reply sent"
        );

        PipelineOutcome::Replied {
            customer_phone: message.sender,
            customer_message: message.body,
            reply,
            credits_remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use swiftreply_shared::{MemoryAccountStore, PlanTier, TenantAccount};

    use crate::dispatch::DeliveryReceipt;
    use crate::error::AgentError;
    use crate::generate::ReplyBackend;

    struct FixedBackend(&'static str);

    #[async_trait]
    impl ReplyBackend for FixedBackend {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, AgentError> {
            Ok(self.0.to_string())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ReplyBackend for FailingBackend {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, AgentError> {
            Err(AgentError::Generation("backend down".to_string()))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ChannelTransport for RecordingTransport {
        async fn send_text(&self, to: &str, body: &str) -> Result<DeliveryReceipt, AgentError> {
            if self.fail {
                return Err(AgentError::Dispatch("rejected".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(DeliveryReceipt {
                provider_message_id: Some("out.1".to_string()),
                mocked: false,
            })
        }
        fn name(&self) -> &'static str {
            "recording"
        }
    }

    async fn seed_growth_tenant(store: &MemoryAccountStore, credits: i64) -> TenantAccount {
        let mut account = TenantAccount::new("owner@example.com");
        account.company_name = Some("Sunrise Dental".to_string());
        account.channel_phone = Some("15559990000".to_string());
        account.business_context = Some("Dental clinic, open 9-5".to_string());
        account.tier = PlanTier::Growth;
        account.ai_credits_remaining = credits;
        store.insert_account(account).await.unwrap()
    }

    fn text_envelope(message_id: &str, body: &str) -> WebhookEnvelope {
        serde_json::from_value(serde_json::json!({
            "entry": [{"changes": [{"value": {
                "messages": [{"id": message_id, "from": "15550001111",
                              "type": "text", "text": {"body": body}}],
                "metadata": {"display_phone_number": "15559990000", "phone_number_id": "123"}
            }}]}]
        }))
        .unwrap()
    }

    fn pipeline_with(
        store: Arc<MemoryAccountStore>,
        backend: Arc<dyn ReplyBackend>,
        transport: Arc<RecordingTransport>,
    ) -> ReplyPipeline {
        ReplyPipeline::new(store, ReplyGenerator::new(backend), transport)
    }

    // End-to-end: growth tenant with 5 credits gets a reply and a debit.
    #[tokio::test]
    async fn successful_reply_debits_one_credit() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed_growth_tenant(&store, 5).await;
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(
            store.clone(),
            Arc::new(FixedBackend("We are open 9-5")),
            transport.clone(),
        );

        let outcome = pipeline
            .handle(&text_envelope("wamid.1", "What are your hours?"))
            .await;

        match outcome {
            PipelineOutcome::Replied {
                customer_phone,
                customer_message,
                reply,
                credits_remaining,
            } => {
                assert_eq!(customer_phone, "15550001111");
                assert_eq!(customer_message, "What are your hours?");
                assert_eq!(reply, "We are open 9-5");
                assert_eq!(credits_remaining, 4);
            }
            other => panic!("expected Replied, got {other:?}"),
        }

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("15550001111".to_string(), "We are open 9-5".to_string()));

        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 4);
    }

    #[tokio::test]
    async fn no_messages_array_is_noop_with_zero_mutations() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed_growth_tenant(&store, 5).await;
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(store.clone(), Arc::new(FixedBackend("hi")), transport.clone());

        let envelope: WebhookEnvelope = serde_json::from_value(serde_json::json!({
            "entry": [{"changes": [{"value": {"statuses": [{"status": "read"}]}}]}]
        }))
        .unwrap();
        let outcome = pipeline.handle(&envelope).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Ignored(IgnoreReason::NoMessages)
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 5);
    }

    #[tokio::test]
    async fn ineligible_plan_yields_no_reply_and_no_debit() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut account = TenantAccount::new("starter@example.com");
        account.channel_phone = Some("15559990000".to_string());
        account.tier = PlanTier::Starter;
        account.ai_credits_remaining = 100;
        let account = store.insert_account(account).await.unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(store.clone(), Arc::new(FixedBackend("hi")), transport.clone());

        let outcome = pipeline.handle(&text_envelope("wamid.1", "hello")).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::EntitlementDenied(DenyReason::PlanIneligible)
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 100);
    }

    // Balance 1: first webhook replies and lands at 0, the second is
    // denied with no_credits.
    #[tokio::test]
    async fn last_credit_then_denial() {
        let store = Arc::new(MemoryAccountStore::new());
        seed_growth_tenant(&store, 1).await;
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(store.clone(), Arc::new(FixedBackend("hi")), transport.clone());

        let first = pipeline.handle(&text_envelope("wamid.1", "hello")).await;
        match first {
            PipelineOutcome::Replied {
                credits_remaining, ..
            } => assert_eq!(credits_remaining, 0),
            other => panic!("expected Replied, got {other:?}"),
        }

        let second = pipeline.handle(&text_envelope("wamid.2", "hello again")).await;
        assert!(matches!(
            second,
            PipelineOutcome::EntitlementDenied(DenyReason::NoCredits)
        ));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generation_failure_halts_before_dispatch_and_debit() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed_growth_tenant(&store, 5).await;
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(store.clone(), Arc::new(FailingBackend), transport.clone());

        let outcome = pipeline.handle(&text_envelope("wamid.1", "hello")).await;
        assert!(matches!(outcome, PipelineOutcome::GenerationFailed));
        assert!(transport.sent.lock().unwrap().is_empty());
        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 5);
    }

    #[tokio::test]
    async fn dispatch_failure_means_no_debit() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed_growth_tenant(&store, 5).await;
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(vec![]),
            fail: true,
        });
        let pipeline = pipeline_with(store.clone(), Arc::new(FixedBackend("hi")), transport);

        let outcome = pipeline.handle(&text_envelope("wamid.1", "hello")).await;
        assert!(matches!(outcome, PipelineOutcome::DispatchFailed));
        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 5, "No debit without delivery");
    }

    #[tokio::test]
    async fn redelivered_message_id_is_dropped() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed_growth_tenant(&store, 5).await;
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(store.clone(), Arc::new(FixedBackend("hi")), transport.clone());

        let envelope = text_envelope("wamid.same", "hello");
        let first = pipeline.handle(&envelope).await;
        assert!(matches!(first, PipelineOutcome::Replied { .. }));

        let second = pipeline.handle(&envelope).await;
        assert!(matches!(second, PipelineOutcome::Redelivered));

        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 4, "Exactly one debit");
    }

    #[tokio::test]
    async fn no_active_tenant_halts_silently() {
        let store = Arc::new(MemoryAccountStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline_with(store, Arc::new(FixedBackend("hi")), transport.clone());

        let outcome = pipeline.handle(&text_envelope("wamid.1", "hello")).await;
        assert!(matches!(outcome, PipelineOutcome::NoTenant));
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
