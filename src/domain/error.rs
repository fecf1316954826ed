//! Error taxonomy for swap orchestration.
//!
//! Validation and authorization errors are resolved before a job ever
//! reaches the settlement monitor. Everything else terminates the job
//! and is surfaced verbatim.

use thiserror::Error;

use super::job::JobState;

/// Every way a swap can fail, from input checks to settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// Bad input. Never reaches the network, never retried.
    #[error("invalid swap request: {0}")]
    Validation(String),

    /// Approval grant could not be obtained; the user must re-approve.
    #[error("authorization for {token} failed: {reason}")]
    Authorization { token: String, reason: String },

    /// Direct transfer of the pay token failed before submission.
    #[error("transfer of {token} failed: {reason}")]
    Transfer { token: String, reason: String },

    /// Backend rejected the swap intent outright.
    #[error("swap rejected by backend: {0}")]
    Submission(String),

    /// Submission was sent but no verdict came back. The swap may still
    /// execute, so it must not be resent without confirmation.
    #[error("swap submission outcome unknown, check balances before retrying: {0}")]
    SubmissionUnknown(String),

    /// Status poll could not reach the backend.
    #[error("status poll failed: {0}")]
    PollTransport(String),

    /// Backend executed the swap and reported failure (reason verbatim).
    #[error("{0}")]
    BackendReported(String),

    /// Attempt budget exhausted without a terminal status. Outcome unknown.
    #[error("swap outcome unknown after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// Service is shutting down; no new settlement monitors start.
    #[error("settlement monitor is shut down")]
    ShuttingDown,

    #[error("no swap job with id {0}")]
    UnknownJob(String),

    #[error("illegal job transition {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },
}

impl SwapError {
    /// Errors that are settled locally and never enter the monitor.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Authorization { .. })
    }
}
