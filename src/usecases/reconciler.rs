//! Balance Reconciler - Post-settlement Balance Refresh
//!
//! After a swap settles, both affected balances are re-read so the UI
//! agrees with the ledger. Ledger read replicas lag, so an immediate
//! read is followed by a few delayed re-checks. Everything here is best
//! effort and runs on its own task: a failure is logged and never
//! touches the swap job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::domain::token::{Amount, TokenDescriptor};
use crate::ports::clock::Clock;
use crate::ports::ledger::LedgerGateway;
use crate::usecases::events::{EventBus, SwapEvent};

/// Re-check schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
  /// Offsets from the refresh request at which balances are re-read.
  pub recheck_delays: Vec<Duration>,
}

impl Default for ReconcilerConfig {
  fn default() -> Self {
    Self {
      recheck_delays: vec![
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(5),
      ],
    }
  }
}

/// Last balance read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBalance {
  pub amount: Amount,
  pub updated_at: DateTime<Utc>,
}

/// Re-reads balances after settlement and keeps the latest values.
pub struct BalanceReconciler {
  ledger: Arc<dyn LedgerGateway>,
  clock: Arc<dyn Clock>,
  events: EventBus,
  config: ReconcilerConfig,
  /// Keyed by (symbol, owner).
  balances: RwLock<HashMap<(String, String), CachedBalance>>,
}

impl BalanceReconciler {
  pub fn new(
    ledger: Arc<dyn LedgerGateway>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: ReconcilerConfig,
  ) -> Self {
    Self {
      ledger,
      clock,
      events,
      config,
      balances: RwLock::new(HashMap::new()),
    }
  }

  /// Schedule an immediate refresh plus the delayed re-checks.
  ///
  /// Returns the task handle; callers normally drop it.
  pub fn refresh(self: &Arc<Self>, tokens: Vec<TokenDescriptor>, owner: String) -> JoinHandle<()> {
    let this = Arc::clone(self);
    tokio::spawn(async move {
      let started = Instant::now();
      this.refresh_now(&tokens, &owner).await;
      for delay in &this.config.recheck_delays {
        sleep_until(started + *delay).await;
        this.refresh_now(&tokens, &owner).await;
      }
      debug!(owner = %owner, "Balance reconciliation finished");
    })
  }

  /// Read every token balance once, concurrently. Returns how many succeeded.
  pub async fn refresh_now(&self, tokens: &[TokenDescriptor], owner: &str) -> usize {
    let reads = join_all(tokens.iter().map(|t| self.ledger.balance_of(t, owner))).await;

    let mut refreshed = 0;
    for (token, read) in tokens.iter().zip(reads) {
      match read {
        Ok(amount) => {
          self.balances.write().await.insert(
            (token.symbol.clone(), owner.to_string()),
            CachedBalance {
              amount: amount.clone(),
              updated_at: self.clock.now(),
            },
          );
          self.events.emit(SwapEvent::BalanceRefreshed {
            symbol: token.symbol.clone(),
            owner: owner.to_string(),
            balance: amount,
          });
          refreshed += 1;
        }
        Err(e) => {
          warn!(token = %token.symbol, owner = %owner, error = %e, "Balance refresh failed");
        }
      }
    }
    refreshed
  }

  /// Last known balance, if any read succeeded.
  pub async fn balance(&self, symbol: &str, owner: &str) -> Option<CachedBalance> {
    self
      .balances
      .read()
      .await
      .get(&(symbol.to_string(), owner.to_string()))
      .cloned()
  }
}
