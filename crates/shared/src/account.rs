//! Tenant account model and the credit ledger audit record.

use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::tiers::{PlanStatus, PlanTier};

/// Characters used for referral codes. No lowercase: codes are compared
/// uppercase-normalized so they survive being typed or pasted.
const REFERRAL_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERRAL_CODE_LEN: usize = 8;

/// A business account on the platform.
///
/// Accounts are created at registration, mutated by payment-provider events
/// and the credit/referral ledgers, and soft-deactivated rather than
/// hard-deleted. The credit balance is never negative; `referred_by` is
/// immutable once set.
#[derive(Debug, Clone, Serialize)]
pub struct TenantAccount {
    pub id: Uuid,
    pub email: String,
    pub company_name: Option<String>,
    /// Channel-side destination address registered for this tenant.
    pub channel_phone: Option<String>,
    /// Free-text business context fed to the reply generator.
    pub business_context: Option<String>,
    pub tier: PlanTier,
    pub status: PlanStatus,
    pub ai_credits_remaining: i64,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub total_referrals: i32,
    pub referral_credits: i32,
    /// Payment-provider customer id, set when a checkout completes.
    pub billing_customer_id: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TenantAccount {
    /// New account with signup defaults. Callers adjust fields before
    /// inserting into the store.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            company_name: None,
            channel_phone: None,
            business_context: None,
            tier: PlanTier::Free,
            status: PlanStatus::Active,
            ai_credits_remaining: 0,
            referral_code: generate_referral_code(),
            referred_by: None,
            total_referrals: 0,
            referral_credits: 0,
            billing_customer_id: None,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Generate a short, unique-enough referral code.
pub fn generate_referral_code() -> String {
    let mut rng = rand::rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..REFERRAL_CODE_CHARS.len());
            REFERRAL_CODE_CHARS[idx] as char
        })
        .collect()
}

/// Codes are stored uppercase; normalize user input the same way before
/// any comparison or lookup.
pub fn normalize_referral_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// One applied credit delta, kept as an audit trail next to the running
/// balance. The balance is authoritative; entries exist for debugging and
/// invariant checks.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub delta: i64,
    pub reason: String,
    pub balance_after: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl LedgerEntry {
    pub fn new(account_id: Uuid, delta: i64, reason: &str, balance_after: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            delta,
            reason: reason.to_string(),
            balance_after,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_defaults() {
        let account = TenantAccount::new("owner@example.com");
        assert_eq!(account.tier, PlanTier::Free);
        assert_eq!(account.status, PlanStatus::Active);
        assert_eq!(account.ai_credits_remaining, 0);
        assert!(account.referred_by.is_none());
        assert!(account.is_active);
        assert_eq!(account.referral_code.len(), REFERRAL_CODE_LEN);
    }

    #[test]
    fn referral_codes_are_uppercase_and_distinct() {
        let a = generate_referral_code();
        let b = generate_referral_code();
        assert_eq!(a, a.to_ascii_uppercase());
        // Collisions are possible in principle, vanishingly unlikely here.
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_referral_code("  ab12cd34 "), "AB12CD34");
    }
}
