// Agent crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swiftreply autonomous reply agent
//!
//! The webhook-triggered pipeline that answers inbound customer messages:
//! normalize the provider envelope, resolve the owning tenant, gate on plan
//! and credit entitlement, generate a reply, dispatch it over the channel,
//! and debit the credit ledger only after a successful dispatch.
//!
//! The generative backend and the channel transport are capability traits
//! with live and offline/mock implementations, so the whole pipeline runs
//! deterministically without network credentials.

pub mod dedupe;
pub mod dispatch;
pub mod entitlement;
pub mod envelope;
pub mod error;
pub mod generate;
pub mod pipeline;
pub mod resolver;

pub use dedupe::RedeliveryWindow;
pub use dispatch::{
    transport_from_credentials, ChannelTransport, CloudApiTransport, DeliveryReceipt,
    MockTransport,
};
pub use entitlement::{check as check_entitlement, Decision, DenyReason};
pub use envelope::{normalize, IgnoreReason, InboundMessage, Normalized, WebhookEnvelope};
pub use error::AgentError;
pub use generate::{OfflineBackend, OpenAiBackend, ReplyBackend, ReplyGenerator};
pub use pipeline::{PipelineOutcome, ReplyPipeline};
pub use resolver::TenantResolver;
