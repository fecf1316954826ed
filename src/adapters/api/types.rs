//! Wire Request/Response Types
//!
//! JSON shapes exchanged with the swap backend and the ledger gateway.
//! Amounts travel as decimal strings so no hop ever rounds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::TransferEvidence;
use crate::domain::status::{JobStatusReport, TypedStatus};
use crate::domain::token::{Amount, amount_str, amount_str_opt};

/// `POST /swaps` body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitSwapRequest {
  pub pay_token: String,
  #[serde(with = "amount_str")]
  pub pay_amount: Amount,
  pub receive_token: String,
  pub receive_address: String,
  #[serde(with = "amount_str_opt", skip_serializing_if = "Option::is_none")]
  pub min_receive: Option<Amount>,
  /// Present for direct-transfer tokens.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub transfer: Option<TransferEvidence>,
}

/// `POST /swaps` reply: exactly one of the fields is set.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitSwapResponse {
  #[serde(default)]
  pub job_id: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

/// `POST /requests` body.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusRequest<'a> {
  pub job_ids: &'a [String],
}

/// One element of the `POST /requests` reply, in request order.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusEntry {
  #[serde(default)]
  pub statuses: Vec<String>,
  /// Typed reply, present once the swap leg executed.
  #[serde(default)]
  pub reply: Option<TypedStatus>,
}

impl From<JobStatusEntry> for JobStatusReport {
  fn from(entry: JobStatusEntry) -> Self {
    Self {
      statuses: entry.statuses,
      payload: entry.reply,
    }
  }
}

/// `GET /ledgers/{ledger}/balance/{owner}` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
  #[serde(with = "amount_str")]
  pub balance: Amount,
}

/// `POST /ledgers/{ledger}/transfer` body.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
  pub from: String,
  pub to: String,
  #[serde(with = "amount_str")]
  pub amount: Amount,
  /// Base64-encoded memo bytes.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub memo: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

/// `POST /ledgers/{ledger}/approve` body.
#[derive(Debug, Clone, Serialize)]
pub struct ApproveRequest {
  pub from: String,
  pub spender: String,
  #[serde(with = "amount_str")]
  pub amount: Amount,
  pub expires_at: DateTime<Utc>,
}

/// Reply of the ledger write calls: a block index or an error.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerWriteResponse {
  #[serde(default)]
  pub block_index: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

/// `GET /ledgers/{ledger}/allowance/{owner}/{spender}` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowanceResponse {
  #[serde(with = "amount_str")]
  pub allowance: Amount,
  #[serde(default)]
  pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_entry_maps_reply_to_payload() {
    let raw = r#"[
      {"statuses": ["Started", "Swapping"]},
      {"statuses": ["Success"], "reply": {"status": "Success", "receive_amount": "123456789012345678901234567890"}}
    ]"#;
    let entries: Vec<JobStatusEntry> = serde_json::from_str(raw).unwrap();
    let reports: Vec<JobStatusReport> = entries.into_iter().map(Into::into).collect();

    assert!(reports[0].payload.is_none());
    let payload = reports[1].payload.as_ref().unwrap();
    assert!(payload.is_success());
    assert_eq!(
      payload.receive_amount.as_ref().unwrap().to_string(),
      "123456789012345678901234567890"
    );
  }

  #[test]
  fn test_submit_request_omits_absent_fields() {
    let req = SubmitSwapRequest {
      pay_token: "ICP".into(),
      pay_amount: Amount::from(100_000_000u64),
      receive_token: "ckBTC".into(),
      receive_address: "owner".into(),
      min_receive: None,
      transfer: None,
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["pay_amount"], "100000000");
    assert!(json.get("min_receive").is_none());
    assert!(json.get("transfer").is_none());
  }
}
