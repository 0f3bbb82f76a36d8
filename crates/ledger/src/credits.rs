//! Credit ledger
//!
//! Every balance change goes through `debit` or `credit` so the audit trail
//! stays complete. Debits are never speculative: the reply pipeline calls
//! `debit` only after a successful dispatch, and the store's
//! compare-and-decrement re-checks the balance to close the race window
//! between the entitlement gate and the debit.

use std::sync::Arc;

use swiftreply_shared::{AccountStore, LedgerEntry};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Why a credit delta was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditReason {
    AiReplySent,
    ReferralBonusReferrer,
    ReferralBonusReferee,
    SignupGrant,
}

impl CreditReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditReason::AiReplySent => "ai_reply_sent",
            CreditReason::ReferralBonusReferrer => "referral_bonus_referrer",
            CreditReason::ReferralBonusReferee => "referral_bonus_referee",
            CreditReason::SignupGrant => "signup_grant",
        }
    }
}

impl std::fmt::Display for CreditReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn AccountStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Decrement the account's balance. Fails with
    /// [`LedgerError::InsufficientCredits`] when the balance is below
    /// `amount`; the balance never goes negative. Returns the new balance.
    pub async fn debit(
        &self,
        account_id: Uuid,
        amount: i64,
        reason: CreditReason,
    ) -> LedgerResult<i64> {
        let balance = self.store.debit_credits(account_id, amount).await?;
        self.record(account_id, -amount, reason, balance).await;
        tracing::info!(
            %account_id,
            amount,
            reason = %reason,
            balance,
            "Debited AI credits"
        );
        Ok(balance)
    }

    /// Increase the account's balance. No upper bound. Returns the new
    /// balance.
    pub async fn credit(
        &self,
        account_id: Uuid,
        amount: i64,
        reason: CreditReason,
    ) -> LedgerResult<i64> {
        let balance = self.store.credit_credits(account_id, amount).await?;
        self.record(account_id, amount, reason, balance).await;
        tracing::info!(
            %account_id,
            amount,
            reason = %reason,
            balance,
            "Credited AI credits"
        );
        Ok(balance)
    }

    /// Audit entries are best-effort: a failed write is logged, never
    /// propagated, because the balance mutation already committed.
    pub(crate) async fn record(
        &self,
        account_id: Uuid,
        delta: i64,
        reason: CreditReason,
        balance_after: i64,
    ) {
        let entry = LedgerEntry::new(account_id, delta, reason.as_str(), balance_after);
        if let Err(e) = self.store.record_ledger_entry(entry).await {
            tracing::warn!(%account_id, error = %e, "Failed to record ledger entry");
        }
    }
}
