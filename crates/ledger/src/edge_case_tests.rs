// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Ledgers
//!
//! Tests critical boundary conditions and race conditions in:
//! - Credit ledger (LED-C01 to LED-C06)
//! - Referral ledger (LED-R01 to LED-R08)
//! - Invariant checks (LED-I01 to LED-I04)

#[cfg(test)]
mod credit_ledger_tests {
    use crate::credits::{CreditLedger, CreditReason};
    use crate::error::LedgerError;
    use std::sync::Arc;
    use swiftreply_shared::{AccountStore, MemoryAccountStore, TenantAccount};

    async fn seed(store: &MemoryAccountStore, credits: i64) -> TenantAccount {
        let mut account = TenantAccount::new("tenant@example.com");
        account.ai_credits_remaining = credits;
        store.insert_account(account).await.unwrap()
    }

    // =========================================================================
    // LED-C01: Debit with sufficient balance - balance decreases
    // =========================================================================
    #[tokio::test]
    async fn test_debit_decrements_balance() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed(&store, 5).await;
        let ledger = CreditLedger::new(store.clone());

        let balance = ledger
            .debit(account.id, 1, CreditReason::AiReplySent)
            .await
            .unwrap();
        assert_eq!(balance, 4);
    }

    // =========================================================================
    // LED-C02: Debit at balance 0 - rejected, balance unchanged
    // =========================================================================
    #[tokio::test]
    async fn test_debit_at_zero_rejected() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed(&store, 0).await;
        let ledger = CreditLedger::new(store.clone());

        let err = ledger
            .debit(account.id, 1, CreditReason::AiReplySent)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                balance: 0,
                requested: 1
            }
        ));

        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.ai_credits_remaining, 0, "Balance must stay at 0");
    }

    // =========================================================================
    // LED-C03: Two concurrent debits at balance 1 - exactly one succeeds
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_debits_at_balance_one() {
        use tokio::sync::Barrier;

        let store = Arc::new(MemoryAccountStore::new());
        let account = seed(&store, 1).await;
        let ledger = CreditLedger::new(store.clone());

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = vec![];

        for _ in 0..2 {
            let ledger = ledger.clone();
            let barrier = Arc::clone(&barrier);
            let account_id = account.id;

            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                ledger.debit(account_id, 1, CreditReason::AiReplySent).await
            }));
        }

        let mut results = vec![];
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(succeeded, 1, "Exactly one debit should succeed");
        assert_eq!(rejected, 1, "Exactly one debit should be rejected");

        let account = store.account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(
            account.ai_credits_remaining, 0,
            "Balance must be 0, never negative"
        );
    }

    // =========================================================================
    // LED-C04: Credit has no upper bound
    // =========================================================================
    #[tokio::test]
    async fn test_credit_unbounded() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed(&store, 0).await;
        let ledger = CreditLedger::new(store.clone());

        let balance = ledger
            .credit(account.id, 1_000_000, CreditReason::SignupGrant)
            .await
            .unwrap();
        assert_eq!(balance, 1_000_000);
    }

    // =========================================================================
    // LED-C05: Every mutation records an audit entry with balance_after
    // =========================================================================
    #[tokio::test]
    async fn test_mutations_record_audit_entries() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = seed(&store, 3).await;
        let ledger = CreditLedger::new(store.clone());

        ledger
            .credit(account.id, 10, CreditReason::ReferralBonusReferee)
            .await
            .unwrap();
        ledger
            .debit(account.id, 1, CreditReason::AiReplySent)
            .await
            .unwrap();

        let entries = store.ledger_entries_for(account.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].delta, 10);
        assert_eq!(entries[0].reason, "referral_bonus_referee");
        assert_eq!(entries[0].balance_after, 13);
        assert_eq!(entries[1].delta, -1);
        assert_eq!(entries[1].reason, "ai_reply_sent");
        assert_eq!(entries[1].balance_after, 12);
    }

    // =========================================================================
    // LED-C06: Debit against a missing account
    // =========================================================================
    #[tokio::test]
    async fn test_debit_missing_account() {
        let store = Arc::new(MemoryAccountStore::new());
        let ledger = CreditLedger::new(store);

        let err = ledger
            .debit(uuid::Uuid::new_v4(), 1, CreditReason::AiReplySent)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound));
    }
}

#[cfg(test)]
mod referral_ledger_tests {
    use crate::error::LedgerError;
    use crate::referral::ReferralLedger;
    use crate::rewards::{REFEREE_BONUS_CREDITS, REFERRER_BONUS_CREDITS, REFERRER_PACK_REWARD};
    use std::sync::Arc;
    use swiftreply_shared::{AccountStore, MemoryAccountStore, TenantAccount};

    async fn seed_pair(store: &MemoryAccountStore) -> (TenantAccount, TenantAccount) {
        let referrer = store
            .insert_account(TenantAccount::new("referrer@example.com"))
            .await
            .unwrap();
        let referee = store
            .insert_account(TenantAccount::new("referee@example.com"))
            .await
            .unwrap();
        (referrer, referee)
    }

    // =========================================================================
    // LED-R01: Successful application rewards both sides once
    // =========================================================================
    #[tokio::test]
    async fn test_dual_sided_reward_amounts() {
        let store = Arc::new(MemoryAccountStore::new());
        let (referrer, referee) = seed_pair(&store).await;
        let ledger = ReferralLedger::new(store.clone());

        let outcome = ledger.apply(&referee, &referrer.referral_code).await.unwrap();
        assert_eq!(outcome.referee_bonus_credits, REFEREE_BONUS_CREDITS);
        assert!(outcome.referrer_rewarded);

        let referrer = store.account_by_id(referrer.id).await.unwrap().unwrap();
        assert_eq!(referrer.total_referrals, 1);
        assert_eq!(referrer.referral_credits, REFERRER_PACK_REWARD);
        assert_eq!(referrer.ai_credits_remaining, REFERRER_BONUS_CREDITS);

        let referee = store.account_by_id(referee.id).await.unwrap().unwrap();
        assert_eq!(referee.referred_by, Some(referrer.id));
        assert_eq!(referee.ai_credits_remaining, REFEREE_BONUS_CREDITS);
    }

    // =========================================================================
    // LED-R02: Second application for the same referee - rejected, no
    // double bonus
    // =========================================================================
    #[tokio::test]
    async fn test_double_application_rejected() {
        let store = Arc::new(MemoryAccountStore::new());
        let (referrer, referee) = seed_pair(&store).await;
        let ledger = ReferralLedger::new(store.clone());

        ledger.apply(&referee, &referrer.referral_code).await.unwrap();

        // Reload so the referee reflects the applied referral.
        let referee = store.account_by_id(referee.id).await.unwrap().unwrap();
        let err = ledger
            .apply(&referee, &referrer.referral_code)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReferred));

        let referrer = store.account_by_id(referrer.id).await.unwrap().unwrap();
        assert_eq!(referrer.total_referrals, 1, "No double reward");
        assert_eq!(referrer.ai_credits_remaining, REFERRER_BONUS_CREDITS);
    }

    // =========================================================================
    // LED-R03: Self-referral by own code - rejected before any mutation
    // =========================================================================
    #[tokio::test]
    async fn test_self_referral_by_code() {
        let store = Arc::new(MemoryAccountStore::new());
        let (_, referee) = seed_pair(&store).await;
        let ledger = ReferralLedger::new(store.clone());

        let err = ledger
            .apply(&referee, &referee.referral_code)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SelfReferral));

        let referee = store.account_by_id(referee.id).await.unwrap().unwrap();
        assert_eq!(referee.ai_credits_remaining, 0, "No mutation on rejection");
        assert!(referee.referred_by.is_none());
    }

    // =========================================================================
    // LED-R04: Code case is normalized - lowercase input still matches
    // =========================================================================
    #[tokio::test]
    async fn test_self_referral_lowercase_code() {
        let store = Arc::new(MemoryAccountStore::new());
        let (_, referee) = seed_pair(&store).await;
        let ledger = ReferralLedger::new(store);

        let lower = referee.referral_code.to_ascii_lowercase();
        let err = ledger.apply(&referee, &lower).await.unwrap_err();
        assert!(matches!(err, LedgerError::SelfReferral));
    }

    // =========================================================================
    // LED-R05: Resolved-account-is-self - rejected even when the string
    // compare is bypassed via a stale snapshot
    // =========================================================================
    #[tokio::test]
    async fn test_self_referral_by_resolved_account() {
        let store = Arc::new(MemoryAccountStore::new());
        let (_, referee) = seed_pair(&store).await;
        let ledger = ReferralLedger::new(store.clone());

        // Caller holds a stale snapshot with a different code string, so
        // the own-code check passes but the code resolves to the caller.
        let mut stale = referee.clone();
        stale.referral_code = "STALECODE".to_string();

        let err = ledger
            .apply(&stale, &referee.referral_code)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SelfReferral));
    }

    // =========================================================================
    // LED-R06: Unknown code
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_code() {
        let store = Arc::new(MemoryAccountStore::new());
        let (_, referee) = seed_pair(&store).await;
        let ledger = ReferralLedger::new(store);

        let err = ledger.apply(&referee, "NOSUCHCODE").await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownReferralCode));
    }

    // =========================================================================
    // LED-R07: Concurrent applications for the same referee - exactly one
    // succeeds
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_applications_one_wins() {
        use tokio::sync::Barrier;

        let store = Arc::new(MemoryAccountStore::new());
        let referrer_a = store
            .insert_account(TenantAccount::new("a@example.com"))
            .await
            .unwrap();
        let referrer_b = store
            .insert_account(TenantAccount::new("b@example.com"))
            .await
            .unwrap();
        let referee = store
            .insert_account(TenantAccount::new("referee@example.com"))
            .await
            .unwrap();
        let ledger = ReferralLedger::new(store.clone());

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = vec![];

        for code in [referrer_a.referral_code.clone(), referrer_b.referral_code.clone()] {
            let ledger = ledger.clone();
            let barrier = Arc::clone(&barrier);
            let referee = referee.clone();

            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                ledger.apply(&referee, &code).await
            }));
        }

        let mut results = vec![];
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1, "Exactly one application should win");

        let referee = store.account_by_id(referee.id).await.unwrap().unwrap();
        assert_eq!(
            referee.ai_credits_remaining, 10,
            "Referee bonus granted exactly once"
        );
    }

    // =========================================================================
    // LED-R08: Leaderboard orders by referral count descending, top 10
    // =========================================================================
    #[tokio::test]
    async fn test_leaderboard_ordering() {
        let store = Arc::new(MemoryAccountStore::new());
        for i in 0..12 {
            let mut account = TenantAccount::new(format!("tenant{i}@example.com"));
            account.company_name = Some(format!("Shop {i}"));
            account.total_referrals = i;
            store.insert_account(account).await.unwrap();
        }
        let ledger = ReferralLedger::new(store);

        let rows = ledger.leaderboard(10).await.unwrap();
        assert_eq!(rows.len(), 10, "Zero-referral accounts excluded, capped at 10");
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].referrals, 11);
        assert!(rows.windows(2).all(|w| w[0].referrals >= w[1].referrals));
    }
}

#[cfg(test)]
mod invariant_tests {
    use crate::invariants::{InvariantChecker, ViolationSeverity};
    use crate::referral::ReferralLedger;
    use std::sync::Arc;
    use swiftreply_shared::{AccountStore, MemoryAccountStore, PlanStatus, TenantAccount};

    // =========================================================================
    // LED-I01: Healthy store passes every check
    // =========================================================================
    #[tokio::test]
    async fn test_healthy_store_passes() {
        let store = Arc::new(MemoryAccountStore::new());
        let referrer = store
            .insert_account(TenantAccount::new("referrer@example.com"))
            .await
            .unwrap();
        let referee = store
            .insert_account(TenantAccount::new("referee@example.com"))
            .await
            .unwrap();
        ReferralLedger::new(store.clone())
            .apply(&referee, &referrer.referral_code)
            .await
            .unwrap();

        let summary = InvariantChecker::new(store).run_all_checks().await.unwrap();
        assert!(summary.healthy, "violations: {:?}", summary.violations);
        assert_eq!(summary.checks_passed, summary.checks_run);
    }

    // =========================================================================
    // LED-I02: Hand-corrupted negative balance is flagged critical
    // =========================================================================
    #[tokio::test]
    async fn test_negative_balance_flagged() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut account = TenantAccount::new("corrupt@example.com");
        account.ai_credits_remaining = -3;
        store.insert_account(account).await.unwrap();

        let violations = InvariantChecker::new(store)
            .run_check("non_negative_balance")
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Critical);
    }

    // =========================================================================
    // LED-I03: Self-referral edge is flagged
    // =========================================================================
    #[tokio::test]
    async fn test_self_edge_flagged() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut account = TenantAccount::new("loop@example.com");
        account.referred_by = Some(account.id);
        store.insert_account(account).await.unwrap();

        let violations = InvariantChecker::new(store)
            .run_check("no_self_referral")
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);
    }

    // =========================================================================
    // LED-I04: Referral counter drift is flagged
    // =========================================================================
    #[tokio::test]
    async fn test_counter_drift_flagged() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut account = TenantAccount::new("drift@example.com");
        account.total_referrals = 5;
        store.insert_account(account).await.unwrap();

        let violations = InvariantChecker::new(store.clone())
            .run_check("referral_counts_match")
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);

        // Deactivated-but-active-status is a separate, medium-severity check.
        let mut stale = TenantAccount::new("stale@example.com");
        stale.is_active = false;
        stale.status = PlanStatus::Active;
        store.insert_account(stale).await.unwrap();

        let violations = InvariantChecker::new(store)
            .run_check("deactivated_status")
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Medium);
    }
}
