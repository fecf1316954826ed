//! Allowance Precheck - Approval Grants Before Pulling Funds
//!
//! Makes sure the backend's spender account may move the pay amount
//! before a swap is submitted:
//! 1. Tokens without approval support need nothing here
//! 2. A fresh cached grant that covers amount + fee reserve is trusted
//! 3. Otherwise the ledger's current grant is read and trusted if it covers
//! 4. Otherwise a new grant sized `amount + k * fee` is requested
//!
//! Failure to obtain a grant is reported to the caller, never retried.
//! Once a swap is handed to the backend its pull is deducted from the
//! cached grant, so the cache never vouches for funds already spent.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::domain::allowance::{AllowanceKey, AllowancePolicy, AllowanceRecord};
use crate::domain::error::SwapError;
use crate::domain::token::{Amount, TokenDescriptor};
use crate::ports::clock::Clock;
use crate::ports::ledger::LedgerGateway;
use crate::usecases::events::{EventBus, SwapEvent};

/// How the allowance requirement was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceOutcome {
  /// Token moves by direct transfer; nothing to authorize.
  NotRequired,
  /// Advisory cache already covered the amount.
  Cached,
  /// Grant already on the ledger covered the amount.
  Existing,
  /// A new grant was issued.
  Granted { approval_id: String, amount: Amount },
}

impl AllowanceOutcome {
  /// Whether this call issued a new ledger approval.
  pub fn issued_approval(&self) -> bool {
    matches!(self, Self::Granted { .. })
  }
}

/// One entry of a batch check.
#[derive(Debug, Clone)]
pub struct AllowanceRequest {
  pub token: TokenDescriptor,
  pub owner: String,
  pub spender: String,
  pub required: Amount,
}

/// Approval manager with an advisory grant cache.
pub struct AllowancePrecheck {
  ledger: Arc<dyn LedgerGateway>,
  clock: Arc<dyn Clock>,
  events: EventBus,
  policy: AllowancePolicy,
  cache: RwLock<HashMap<AllowanceKey, AllowanceRecord>>,
}

impl AllowancePrecheck {
  pub fn new(
    ledger: Arc<dyn LedgerGateway>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    policy: AllowancePolicy,
  ) -> Self {
    Self {
      ledger,
      clock,
      events,
      policy,
      cache: RwLock::new(HashMap::new()),
    }
  }

  /// Ensure `spender` may move `required` of `token` from `owner`.
  #[instrument(skip(self, token, required), fields(token = %token.symbol, required = %required))]
  pub async fn ensure_allowance(
    &self,
    token: &TokenDescriptor,
    owner: &str,
    spender: &str,
    required: &Amount,
  ) -> Result<AllowanceOutcome, SwapError> {
    if !token.requires_approval() {
      return Ok(AllowanceOutcome::NotRequired);
    }

    let key = AllowanceKey::new(token, owner, spender);
    let reserve = self.policy.reserve(token);
    let now = self.clock.now();

    {
      let cache = self.cache.read().await;
      if let Some(record) = cache.get(&key) {
        if record.covers(required, &reserve, now) {
          debug!("Cached allowance sufficient");
          return Ok(AllowanceOutcome::Cached);
        }
      }
    }

    match self.ledger.allowance(token, owner, spender).await {
      Ok(Some(current)) => {
        let expires_at = current
          .expires_at
          .unwrap_or_else(|| self.policy.grant_expiry(now));
        let record = AllowanceRecord {
          amount: current.amount,
          expires_at,
        };
        if record.covers(required, &reserve, now) {
          info!(allowance = %record.amount, "Ledger allowance sufficient");
          self.cache.write().await.insert(key, record);
          return Ok(AllowanceOutcome::Existing);
        }
      }
      Ok(None) => {}
      Err(e) => {
        // A failed read is not fatal: a fresh grant settles it either way.
        warn!(error = %e, "Allowance query failed, requesting new grant");
      }
    }

    let amount = self.policy.grant_amount(token, required);
    let expires_at = self.policy.grant_expiry(now);
    info!(amount = %amount, expires_at = %expires_at, "Requesting approval");

    let approval_id = self
      .ledger
      .approve(token, spender, &amount, expires_at)
      .await
      .map_err(|e| {
        warn!(error = %e, "Approval rejected");
        SwapError::Authorization {
          token: token.symbol.clone(),
          reason: format!("{e:#}"),
        }
      })?;

    self.cache.write().await.insert(
      key,
      AllowanceRecord {
        amount: amount.clone(),
        expires_at,
      },
    );
    self.events.emit(SwapEvent::AllowanceGranted {
      symbol: token.symbol.clone(),
      amount: amount.clone(),
    });
    info!(approval_id = %approval_id, "Approval granted");

    Ok(AllowanceOutcome::Granted { approval_id, amount })
  }

  /// Run independent checks concurrently; one failure does not cancel
  /// the others. Results come back in request order.
  pub async fn ensure_allowances(
    &self,
    requests: &[AllowanceRequest],
  ) -> Vec<Result<AllowanceOutcome, SwapError>> {
    join_all(requests.iter().map(|r| {
      self.ensure_allowance(&r.token, &r.owner, &r.spender, &r.required)
    }))
    .await
  }

  /// Deduct `amount + fee` pulled by `spender` from the cached grant.
  /// An exhausted record is dropped so the next check reads the ledger.
  pub async fn consume(&self, token: &TokenDescriptor, owner: &str, spender: &str, amount: &Amount) {
    let key = AllowanceKey::new(token, owner, spender);
    let spent = amount + &token.fee;
    let mut cache = self.cache.write().await;
    let exhausted = match cache.get_mut(&key) {
      Some(record) if record.amount > spent => {
        record.amount -= &spent;
        false
      }
      Some(_) => true,
      None => false,
    };
    if exhausted {
      cache.remove(&key);
      debug!("Cached allowance exhausted");
    }
  }
}
