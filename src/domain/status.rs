//! Classification of backend poll responses.
//!
//! The backend reports progress as free-form status strings, plus a typed
//! reply once the swap leg executes. This module turns one response into a
//! verdict against what the job has already seen.

use serde::{Deserialize, Serialize};

use super::job::StatusHistory;
use super::token::{Amount, amount_str_opt};

/// Lexeme marking a failed swap, matched case-insensitively.
pub const FAILURE_MARKER: &str = "failed";

/// Typed status the backend attaches once it executes the swap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedStatus {
    pub status: String,
    #[serde(default, with = "amount_str_opt")]
    pub pay_amount: Option<Amount>,
    #[serde(default, with = "amount_str_opt")]
    pub receive_amount: Option<Amount>,
    #[serde(default)]
    pub tx_id: Option<String>,
}

impl TypedStatus {
    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }
}

/// One job's entry in a status poll response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub payload: Option<TypedStatus>,
}

/// What a single poll response means for the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// Nothing terminal yet.
    Pending { new_statuses: Vec<String> },
    /// Backend reported failure; `reason` is the matching string verbatim.
    Failed {
        reason: String,
        new_statuses: Vec<String>,
    },
    /// Typed payload reported success.
    Succeeded {
        payload: TypedStatus,
        new_statuses: Vec<String>,
    },
}

impl PollVerdict {
    /// Statuses not previously in the job's history, in receipt order.
    pub fn new_statuses(&self) -> &[String] {
        match self {
            Self::Pending { new_statuses }
            | Self::Failed { new_statuses, .. }
            | Self::Succeeded { new_statuses, .. } => new_statuses,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}

/// Whether a status string carries the failure marker.
pub fn is_failure_status(status: &str) -> bool {
    status.to_ascii_lowercase().contains(FAILURE_MARKER)
}

/// Classify a poll response against the statuses already seen.
///
/// Statuses are scanned in order; the first failure stops the scan, so
/// anything after it is neither recorded nor acted on. A failing typed
/// payload counts as failure too.
pub fn classify(report: &JobStatusReport, history: &StatusHistory) -> PollVerdict {
    let mut new_statuses: Vec<String> = Vec::new();

    for status in &report.statuses {
        let seen = history.contains(status) || new_statuses.iter().any(|s| s == status);
        if !seen {
            new_statuses.push(status.clone());
        }
        if is_failure_status(status) {
            return PollVerdict::Failed {
                reason: status.clone(),
                new_statuses,
            };
        }
    }

    match &report.payload {
        Some(payload) if payload.is_success() => PollVerdict::Succeeded {
            payload: payload.clone(),
            new_statuses,
        },
        Some(payload) if is_failure_status(&payload.status) => PollVerdict::Failed {
            reason: payload.status.clone(),
            new_statuses,
        },
        _ => PollVerdict::Pending { new_statuses },
    }
}
