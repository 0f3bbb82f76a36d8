// Ledger crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swiftreply ledgers
//!
//! The two stateful money-adjacent pieces of the platform:
//!
//! - **Credit ledger**: atomic, floor-at-zero debit/credit of a tenant's
//!   AI-credit balance, with an audit entry per mutation.
//! - **Referral ledger**: the one-time, dual-sided reward linking a new
//!   account to its referrer.
//!
//! Both operate through the shared [`AccountStore`] so the same invariants
//! hold against Postgres and the in-memory backend. The invariants module
//! provides runnable consistency checks over either.
//!
//! [`AccountStore`]: swiftreply_shared::AccountStore

pub mod credits;
pub mod error;
pub mod invariants;
pub mod referral;
pub mod rewards;

#[cfg(test)]
mod edge_case_tests;

pub use credits::{CreditLedger, CreditReason};
pub use error::{LedgerError, LedgerResult};
pub use invariants::{
    InvariantChecker, InvariantCheckSummary, InvariantViolation, ViolationSeverity,
};
pub use referral::{LeaderboardRow, ReferralDashboard, ReferralLedger, ReferralOutcome};
