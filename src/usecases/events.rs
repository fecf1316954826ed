//! Event Bus - Outcome Channel to the UI Layer
//!
//! The orchestrator never renders anything. Notifications, poll progress
//! and balance refreshes are published here and consumed by whoever
//! subscribes (HTTP API, metrics, logs).

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::job::{JobId, LocalId};
use crate::domain::token::{Amount, amount_str};

/// Default display duration of non-sticky notifications (ms).
pub const DEFAULT_NOTIFICATION_MS: u64 = 5_000;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
  Info,
  Success,
  Error,
}

/// Human-readable message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub level: NotificationLevel,
  pub text: String,
  /// Display time in milliseconds; 0 keeps it until dismissed.
  pub duration_ms: u64,
  pub local_id: Option<LocalId>,
}

/// Everything the orchestrator publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwapEvent {
  Notification(Notification),
  /// One status poll went out for a job.
  PollAttempt {
    local_id: LocalId,
    job_id: JobId,
    attempt: u32,
    transport_error: bool,
  },
  /// A new approval grant was obtained.
  AllowanceGranted {
    symbol: String,
    #[serde(with = "amount_str")]
    amount: Amount,
  },
  /// A balance was re-read from the ledger.
  BalanceRefreshed {
    symbol: String,
    owner: String,
    #[serde(with = "amount_str")]
    balance: Amount,
  },
}

/// Cloneable broadcast handle for `SwapEvent`s.
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<SwapEvent>,
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
    self.tx.subscribe()
  }

  /// Publish an event. Having no subscriber is fine.
  pub fn emit(&self, event: SwapEvent) {
    if self.tx.send(event).is_err() {
      trace!("No event subscribers, event dropped");
    }
  }

  pub fn info(&self, local_id: Option<LocalId>, text: impl Into<String>) {
    self.notify(NotificationLevel::Info, local_id, text.into(), DEFAULT_NOTIFICATION_MS);
  }

  pub fn success(&self, local_id: Option<LocalId>, text: impl Into<String>) {
    self.notify(NotificationLevel::Success, local_id, text.into(), DEFAULT_NOTIFICATION_MS);
  }

  /// Errors stay on screen until dismissed.
  pub fn error(&self, local_id: Option<LocalId>, text: impl Into<String>) {
    self.notify(NotificationLevel::Error, local_id, text.into(), 0);
  }

  pub fn notify(
    &self,
    level: NotificationLevel,
    local_id: Option<LocalId>,
    text: String,
    duration_ms: u64,
  ) {
    self.emit(SwapEvent::Notification(Notification {
      level,
      text,
      duration_ms,
      local_id,
    }));
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(256)
  }
}
