//! Referral ledger
//!
//! A referral is an edge from referee to referrer, created at most once per
//! referee. Preconditions are checked in order and each failure is
//! distinct; the reward itself is one atomic store transaction, and the
//! `referred_by` guard inside it is what makes the whole operation
//! idempotent under concurrent application.

use std::sync::Arc;

use serde::Serialize;
use swiftreply_shared::{
    normalize_referral_code, AccountStore, ReferralReward, StoreError, TenantAccount,
};

use crate::credits::{CreditLedger, CreditReason};
use crate::error::{LedgerError, LedgerResult};
use crate::rewards::{REFEREE_BONUS_CREDITS, REFERRER_BONUS_CREDITS, REFERRER_PACK_REWARD};

/// What a successful application granted, for the caller's response body.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralOutcome {
    pub referee_bonus_credits: i64,
    pub referrer_rewarded: bool,
    pub referrer_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralDashboard {
    pub referral_code: String,
    pub total_referrals: i32,
    pub referral_credits: i32,
    pub referral_link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub name: String,
    pub referrals: i32,
}

#[derive(Clone)]
pub struct ReferralLedger {
    store: Arc<dyn AccountStore>,
    credits: CreditLedger,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        let credits = CreditLedger::new(store.clone());
        Self { store, credits }
    }

    /// Apply `code` for `referee`. Precondition failures, in order:
    ///
    /// 1. [`LedgerError::SelfReferral`]: code equals the referee's own.
    /// 2. [`LedgerError::AlreadyReferred`]: referee already has a referrer.
    /// 3. [`LedgerError::UnknownReferralCode`]: code resolves to nothing.
    /// 4. [`LedgerError::SelfReferral`]: resolved account is the referee
    ///    (covers code spoofing even if the string compare was bypassed).
    pub async fn apply(&self, referee: &TenantAccount, code: &str) -> LedgerResult<ReferralOutcome> {
        let code = normalize_referral_code(code);

        if code == referee.referral_code {
            return Err(LedgerError::SelfReferral);
        }
        if referee.referred_by.is_some() {
            return Err(LedgerError::AlreadyReferred);
        }
        let referrer = self
            .store
            .account_by_referral_code(&code)
            .await?
            .ok_or(LedgerError::UnknownReferralCode)?;
        if referrer.id == referee.id {
            return Err(LedgerError::SelfReferral);
        }

        let reward = ReferralReward {
            referrer_packs: REFERRER_PACK_REWARD,
            referrer_ai_credits: REFERRER_BONUS_CREDITS,
            referee_ai_credits: REFEREE_BONUS_CREDITS,
        };
        let balances = self
            .store
            .apply_referral_reward(referee.id, referrer.id, reward)
            .await
            .map_err(|e| match e {
                // Lost the race against a concurrent application for the
                // same referee.
                StoreError::Conflict(_) => LedgerError::AlreadyReferred,
                other => other.into(),
            })?;

        self.credits
            .record(
                referee.id,
                REFEREE_BONUS_CREDITS,
                CreditReason::ReferralBonusReferee,
                balances.referee_balance,
            )
            .await;
        self.credits
            .record(
                referrer.id,
                REFERRER_BONUS_CREDITS,
                CreditReason::ReferralBonusReferrer,
                balances.referrer_balance,
            )
            .await;

        tracing::info!(
            referee_id = %referee.id,
            referrer_id = %referrer.id,
            "Referral applied, both sides rewarded"
        );

        Ok(ReferralOutcome {
            referee_bonus_credits: REFEREE_BONUS_CREDITS,
            referrer_rewarded: true,
            referrer_name: referrer
                .company_name
                .clone()
                .unwrap_or_else(|| referrer.email.clone()),
        })
    }

    pub fn dashboard(&self, account: &TenantAccount, link_base: &str) -> ReferralDashboard {
        ReferralDashboard {
            referral_code: account.referral_code.clone(),
            total_referrals: account.total_referrals,
            referral_credits: account.referral_credits,
            referral_link: format!(
                "{}/signup?ref={}",
                link_base.trim_end_matches('/'),
                account.referral_code
            ),
        }
    }

    /// Top referrers, ordered by referral count descending.
    pub async fn leaderboard(&self, limit: i64) -> LedgerResult<Vec<LeaderboardRow>> {
        let leaders = self.store.top_referrers(limit).await?;
        Ok(leaders
            .into_iter()
            .enumerate()
            .map(|(i, account)| LeaderboardRow {
                rank: i + 1,
                name: account
                    .company_name
                    .unwrap_or_else(|| "Anonymous".to_string()),
                referrals: account.total_referrals,
            })
            .collect())
    }
}
