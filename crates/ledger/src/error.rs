//! Ledger error types

use swiftreply_shared::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },

    #[error("account not found")]
    AccountNotFound,

    #[error("you cannot refer yourself")]
    SelfReferral,

    #[error("you have already used a referral code")]
    AlreadyReferred,

    #[error("invalid referral code")]
    UnknownReferralCode,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientCredits { balance, requested } => {
                LedgerError::InsufficientCredits { balance, requested }
            }
            StoreError::NotFound(_) => LedgerError::AccountNotFound,
            other => LedgerError::Store(other),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
