//! Agent error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The generative backend failed: timeout, non-2xx, or a response we
    /// could not extract text from. Soft failure; the pipeline halts
    /// before dispatch and before any ledger debit.
    #[error("generation backend error: {0}")]
    Generation(String),

    /// The channel API rejected the outbound send. Hard failure; no debit.
    #[error("channel dispatch failed: {0}")]
    Dispatch(String),
}
