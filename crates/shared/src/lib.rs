// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swiftreply shared types
//!
//! Tenant account model, plan tiers, and the account store used by both the
//! reply pipeline and the credit/referral ledgers. The store is a capability
//! trait with two backends: Postgres for durable deployments and an
//! in-memory map for tests and credential-free demo runs.

pub mod account;
pub mod db;
pub mod store;
pub mod tiers;

pub use account::{generate_referral_code, normalize_referral_code, LedgerEntry, TenantAccount};
pub use db::create_pool;
pub use store::{
    AccountStore, MemoryAccountStore, PgAccountStore, ReferralBalances, ReferralReward,
    StoreError, StoreResult,
};
pub use tiers::{PlanStatus, PlanTier};
