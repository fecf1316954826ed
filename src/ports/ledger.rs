//! Ledger Gateway Port - Token Ledger Interaction Interface
//!
//! One gateway serves every token: the `TokenDescriptor` passed to each
//! call selects the ledger and its transfer standard at runtime. The
//! gateway acts on behalf of a single wallet identity and keeps no
//! state beyond the request in flight.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::token::{Amount, TokenDescriptor};

/// Ledger-assigned identifier of a completed transfer (block index).
pub type TransferId = String;

/// Ledger-assigned identifier of a completed approval.
pub type ApprovalId = String;

/// Optional knobs for a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
  /// Memo attached to the transfer, visible to the recipient.
  pub memo: Option<Vec<u8>>,
  /// Client timestamp used by ledgers for transaction de-duplication.
  pub created_at: Option<DateTime<Utc>>,
}

/// Grant currently recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAllowance {
  /// Remaining amount the spender may move.
  pub amount: Amount,
  /// Grant expiry; `None` means it never expires.
  pub expires_at: Option<DateTime<Utc>>,
}

/// Trait for token ledger access.
#[async_trait]
pub trait LedgerGateway: Send + Sync + 'static {
  /// Balance of `owner` in minimal units.
  async fn balance_of(&self, token: &TokenDescriptor, owner: &str) -> anyhow::Result<Amount>;

  /// Transfer `amount` from the wallet to `to`.
  async fn transfer(
    &self,
    token: &TokenDescriptor,
    to: &str,
    amount: &Amount,
    opts: &TransferOptions,
  ) -> anyhow::Result<TransferId>;

  /// Authorize `spender` to move up to `amount` until `expires_at`.
  async fn approve(
    &self,
    token: &TokenDescriptor,
    spender: &str,
    amount: &Amount,
    expires_at: DateTime<Utc>,
  ) -> anyhow::Result<ApprovalId>;

  /// Current grant from `owner` to `spender`, if any.
  async fn allowance(
    &self,
    token: &TokenDescriptor,
    owner: &str,
    spender: &str,
  ) -> anyhow::Result<Option<LedgerAllowance>>;
}
