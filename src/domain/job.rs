//! Swap job model and its forward-only lifecycle.
//!
//! ```text
//! Created -> Authorizing? -> Submitted -> Polling -> Success | Failed | TimedOut | Error
//! ```
//!
//! `Polling` may be re-entered; everything else only moves forward and
//! nothing leaves a terminal state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::{Amount, TokenDescriptor, amount_str, amount_str_opt};

/// Backend-assigned job identifier, used as the poll key.
pub type JobId = String;

/// Client-generated correlation id, known before the backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Client-visible lifecycle state of a swap job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Authorizing,
    Submitted,
    Polling,
    Success,
    Failed,
    TimedOut,
    Error,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Authorizing => 1,
            Self::Submitted => 2,
            Self::Polling => 3,
            Self::Success | Self::Failed | Self::TimedOut | Self::Error => 4,
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Staying in the same non-terminal state is allowed (field updates
    /// and `Polling` re-entry).
    pub fn can_advance_to(self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == self || next.rank() > self.rank()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Authorizing => "Authorizing",
            Self::Submitted => "Submitted",
            Self::Polling => "Polling",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::TimedOut => "TimedOut",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Ordered, de-duplicated record of raw backend status strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHistory(Vec<String>);

impl StatusHistory {
    /// Append a status; returns `false` if it was already seen.
    pub fn record(&mut self, status: &str) -> bool {
        if self.contains(status) {
            return false;
        }
        self.0.push(status.to_string());
        true
    }

    pub fn contains(&self, status: &str) -> bool {
        self.0.iter().any(|s| s == status)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Proof that the pay amount already moved (direct-transfer tokens).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvidence {
    /// Ledger the transfer happened on.
    pub ledger: String,
    /// Block index / transaction id returned by the ledger.
    pub transfer_id: String,
}

/// One in-flight or completed swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapJob {
    pub local_id: LocalId,
    pub job_id: Option<JobId>,
    /// Account paying for and receiving the swap.
    pub owner: String,
    pub pay_token: TokenDescriptor,
    pub receive_token: TokenDescriptor,
    #[serde(with = "amount_str")]
    pub pay_amount: Amount,
    /// Quoted receive amount; replaced by the settled amount on success.
    #[serde(with = "amount_str")]
    pub receive_amount: Amount,
    #[serde(default, with = "amount_str_opt")]
    pub min_receive: Option<Amount>,
    pub state: JobState,
    pub status_history: StatusHistory,
    pub evidence: Option<TransferEvidence>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SwapJob {
    /// Short human label, e.g. `1.5 ICP -> ckBTC`.
    pub fn label(&self) -> String {
        format!(
            "{} -> {}",
            self.pay_token.display_amount(&self.pay_amount),
            self.receive_token.symbol
        )
    }
}

/// Caller-facing swap request, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Reuse an id to make a resubmission idempotent client-side.
    #[serde(default)]
    pub local_id: Option<LocalId>,
    pub owner: String,
    pub pay_symbol: String,
    #[serde(with = "amount_str")]
    pub pay_amount: Amount,
    pub receive_symbol: String,
    #[serde(with = "amount_str")]
    pub receive_amount: Amount,
    /// Slippage bound in basis points of `receive_amount`.
    #[serde(default)]
    pub max_slippage_bps: Option<u32>,
}

/// Handle returned once the backend accepted a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub local_id: LocalId,
    pub job_id: Option<JobId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use JobState::*;
        assert!(Created.can_advance_to(Authorizing));
        assert!(Created.can_advance_to(Submitted));
        assert!(Authorizing.can_advance_to(Error));
        assert!(Submitted.can_advance_to(Polling));
        assert!(Polling.can_advance_to(Polling));
        assert!(Polling.can_advance_to(TimedOut));

        assert!(!Submitted.can_advance_to(Authorizing));
        assert!(!Polling.can_advance_to(Created));
        assert!(!Success.can_advance_to(Success));
        assert!(!Failed.can_advance_to(Polling));
        assert!(!TimedOut.can_advance_to(Success));
    }

    #[test]
    fn test_status_history_dedup() {
        let mut history = StatusHistory::default();
        assert!(history.record("Pending"));
        assert!(!history.record("Pending"));
        assert!(history.record("Swapping"));
        assert_eq!(history.as_slice(), ["Pending", "Swapping"]);
    }

    #[test]
    fn test_local_id_round_trip() {
        let id = LocalId::new();
        let parsed: LocalId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<LocalId>().is_err());
    }
}
