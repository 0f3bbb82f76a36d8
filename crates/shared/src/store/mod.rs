//! Account store.
//!
//! Relational storage for tenant accounts and ledger audit rows, expressed
//! as a capability trait so the pipeline and ledgers can run against either
//! a durable Postgres backend or an in-memory map. Schema migration tooling
//! is out of scope; the Postgres backend documents the tables it expects.
//!
//! The credit balance is the only resource mutated by concurrent webhook
//! invocations, so the mutual-exclusion discipline lives here: both
//! backends implement `debit_credits` as an atomic compare-and-decrement
//! scoped to the single account, and `apply_referral_reward` as one
//! transaction guarded on `referred_by` being unset.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::account::{LedgerEntry, TenantAccount};
use crate::tiers::{PlanStatus, PlanTier};

pub mod memory;
pub mod postgres;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },
    #[error("corrupt row: {0}")]
    Decode(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Amounts applied by one successful referral, both sides.
#[derive(Debug, Clone, Copy)]
pub struct ReferralReward {
    pub referrer_packs: i32,
    pub referrer_ai_credits: i64,
    pub referee_ai_credits: i64,
}

/// Post-reward balances, used to record ledger audit entries.
#[derive(Debug, Clone, Copy)]
pub struct ReferralBalances {
    pub referee_balance: i64,
    pub referrer_balance: i64,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: TenantAccount) -> StoreResult<TenantAccount>;
    async fn account_by_id(&self, id: Uuid) -> StoreResult<Option<TenantAccount>>;
    async fn account_by_channel_phone(&self, phone: &str) -> StoreResult<Option<TenantAccount>>;
    async fn account_by_referral_code(&self, code: &str) -> StoreResult<Option<TenantAccount>>;
    async fn account_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> StoreResult<Option<TenantAccount>>;

    /// Arbitrary active account, used by the resolver's demo fallback.
    async fn first_active_account(&self) -> StoreResult<Option<TenantAccount>>;
    async fn list_accounts(&self) -> StoreResult<Vec<TenantAccount>>;
    async fn top_referrers(&self, limit: i64) -> StoreResult<Vec<TenantAccount>>;

    async fn set_plan(&self, id: Uuid, tier: PlanTier, status: PlanStatus) -> StoreResult<()>;
    async fn set_billing_customer(&self, id: Uuid, customer_id: &str) -> StoreResult<()>;
    /// Soft-deactivate; accounts are never hard-deleted.
    async fn deactivate(&self, id: Uuid) -> StoreResult<()>;

    /// Atomic floor-at-zero decrement. Fails with
    /// [`StoreError::InsufficientCredits`] when the balance guard does not
    /// hold, so two concurrent debits can never jointly drive the balance
    /// negative. Returns the new balance.
    async fn debit_credits(&self, id: Uuid, amount: i64) -> StoreResult<i64>;

    /// Unconditional increase, no upper bound. Returns the new balance.
    async fn credit_credits(&self, id: Uuid, amount: i64) -> StoreResult<i64>;

    /// Apply the dual-sided referral reward as a single transaction:
    /// sets the referee's `referred_by`, bumps the referrer's counters and
    /// both balances. Fails with [`StoreError::Conflict`] when the referee
    /// already has a referrer, which is what makes the operation idempotent.
    async fn apply_referral_reward(
        &self,
        referee_id: Uuid,
        referrer_id: Uuid,
        reward: ReferralReward,
    ) -> StoreResult<ReferralBalances>;

    async fn record_ledger_entry(&self, entry: LedgerEntry) -> StoreResult<()>;
    async fn ledger_entries_for(&self, account_id: Uuid) -> StoreResult<Vec<LedgerEntry>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
