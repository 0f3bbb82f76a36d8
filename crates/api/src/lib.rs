// API crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swiftreply API server
//!
//! HTTP surface over the reply pipeline and the ledgers: the channel
//! webhook pair (verification handshake + delivery), the payment-provider
//! webhook that applies account-tier-change events, the direct AI
//! endpoints, and the referral endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
