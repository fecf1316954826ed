//! Swap Backend Port - Remote Swap Execution Interface
//!
//! The backend accepts a swap intent, answers with a job id right away
//! and executes the swap out-of-band. Progress is observed by polling.
//! Routing and venue selection stay on the far side of this trait.

use async_trait::async_trait;

use crate::domain::job::{JobId, TransferEvidence};
use crate::domain::status::JobStatusReport;
use crate::domain::token::Amount;

/// Everything the backend needs to execute one swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
  /// Symbol of the token being paid.
  pub pay_token: String,
  /// Pay amount in minimal units.
  pub pay_amount: Amount,
  /// Symbol of the token being bought.
  pub receive_token: String,
  /// Account credited with the receive token.
  pub receive_address: String,
  /// Reject execution below this receive amount.
  pub min_receive: Option<Amount>,
  /// Transfer proof for tokens without approval support.
  pub evidence: Option<TransferEvidence>,
}

/// Explicit refusal of a swap intent (no route, pool paused, bad input).
///
/// `submit_swap` implementations return this, wrapped in the
/// `anyhow::Error`, only when the backend definitely did not accept the
/// swap. Any other error means the outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct SwapRejected {
  pub reason: String,
}

impl SwapRejected {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }
}

/// Trait for the remote swap executor.
///
/// `submit_swap` is not assumed idempotent on the server side: callers
/// must never resend the same intent after an unknown outcome.
#[async_trait]
pub trait SwapBackend: Send + Sync + 'static {
  /// Submit a swap intent; returns the backend job id.
  ///
  /// # Errors
  /// `SwapRejected` for an immediate rejection (no route, insufficient
  /// liquidity). Transport and decode failures come back as plain errors.
  async fn submit_swap(&self, intent: &SwapIntent) -> anyhow::Result<JobId>;

  /// Fetch status for the given jobs, one report per id, in request order.
  async fn job_status(&self, job_ids: &[JobId]) -> anyhow::Result<Vec<JobStatusReport>>;
}
