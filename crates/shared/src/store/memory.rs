//! In-memory implementation of the account store.
//!
//! Backs tests and credential-free demo runs. Not durable: all state is
//! lost on restart. Mutations take the single write lock, which gives the
//! same per-account mutual exclusion the Postgres backend gets from its
//! transactional guards.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::{normalize_referral_code, LedgerEntry, TenantAccount};
use crate::tiers::{PlanStatus, PlanTier};

use super::{AccountStore, ReferralBalances, ReferralReward, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, TenantAccount>,
    ledger: Vec<LedgerEntry>,
}

#[derive(Default)]
pub struct MemoryAccountStore {
    inner: RwLock<Inner>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert_account(&self, account: TenantAccount) -> StoreResult<TenantAccount> {
        let mut inner = self.inner.write().await;
        if inner.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        if inner
            .accounts
            .values()
            .any(|a| a.referral_code == account.referral_code)
        {
            return Err(StoreError::Conflict(format!(
                "referral code {} already taken",
                account.referral_code
            )));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account_by_id(&self, id: Uuid) -> StoreResult<Option<TenantAccount>> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.get(&id).cloned())
    }

    async fn account_by_channel_phone(&self, phone: &str) -> StoreResult<Option<TenantAccount>> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.channel_phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn account_by_referral_code(&self, code: &str) -> StoreResult<Option<TenantAccount>> {
        let code = normalize_referral_code(code);
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.referral_code == code)
            .cloned())
    }

    async fn account_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> StoreResult<Option<TenantAccount>> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.billing_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn first_active_account(&self) -> StoreResult<Option<TenantAccount>> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.values().find(|a| a.is_active).cloned())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<TenantAccount>> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.values().cloned().collect())
    }

    async fn top_referrers(&self, limit: i64) -> StoreResult<Vec<TenantAccount>> {
        let inner = self.inner.read().await;
        let mut leaders: Vec<TenantAccount> = inner
            .accounts
            .values()
            .filter(|a| a.total_referrals > 0)
            .cloned()
            .collect();
        leaders.sort_by(|a, b| b.total_referrals.cmp(&a.total_referrals));
        leaders.truncate(limit.max(0) as usize);
        Ok(leaders)
    }

    async fn set_plan(&self, id: Uuid, tier: PlanTier, status: PlanStatus) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.tier = tier;
        account.status = status;
        Ok(())
    }

    async fn set_billing_customer(&self, id: Uuid, customer_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.billing_customer_id = Some(customer_id.to_string());
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.is_active = false;
        account.status = PlanStatus::Inactive;
        Ok(())
    }

    async fn debit_credits(&self, id: Uuid, amount: i64) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        // Re-check under the write lock: this is the race-window close for
        // two concurrent debits that both saw a positive balance.
        if account.ai_credits_remaining < amount {
            return Err(StoreError::InsufficientCredits {
                balance: account.ai_credits_remaining,
                requested: amount,
            });
        }
        account.ai_credits_remaining -= amount;
        Ok(account.ai_credits_remaining)
    }

    async fn credit_credits(&self, id: Uuid, amount: i64) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.ai_credits_remaining += amount;
        Ok(account.ai_credits_remaining)
    }

    async fn apply_referral_reward(
        &self,
        referee_id: Uuid,
        referrer_id: Uuid,
        reward: ReferralReward,
    ) -> StoreResult<ReferralBalances> {
        let mut inner = self.inner.write().await;

        let referee = inner
            .accounts
            .get(&referee_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {referee_id}")))?;
        if referee.referred_by.is_some() {
            return Err(StoreError::Conflict(
                "referral already applied for this account".to_string(),
            ));
        }
        if !inner.accounts.contains_key(&referrer_id) {
            return Err(StoreError::NotFound(format!("account {referrer_id}")));
        }

        // Both sides mutate under the same write lock, so the reward is
        // all-or-nothing like the Postgres transaction.
        let referee_balance = {
            let referee = inner
                .accounts
                .get_mut(&referee_id)
                .ok_or_else(|| StoreError::NotFound(format!("account {referee_id}")))?;
            referee.referred_by = Some(referrer_id);
            referee.ai_credits_remaining += reward.referee_ai_credits;
            referee.ai_credits_remaining
        };
        let referrer_balance = {
            let referrer = inner
                .accounts
                .get_mut(&referrer_id)
                .ok_or_else(|| StoreError::NotFound(format!("account {referrer_id}")))?;
            referrer.total_referrals += 1;
            referrer.referral_credits += reward.referrer_packs;
            referrer.ai_credits_remaining += reward.referrer_ai_credits;
            referrer.ai_credits_remaining
        };

        Ok(ReferralBalances {
            referee_balance,
            referrer_balance,
        })
    }

    async fn record_ledger_entry(&self, entry: LedgerEntry) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.ledger.push(entry);
        Ok(())
    }

    async fn ledger_entries_for(&self, account_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
