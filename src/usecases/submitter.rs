//! Swap Submitter - Validate, Authorize, Submit, Hand Off
//!
//! Submission flow:
//! 1. Validate the request against the token catalog (no I/O)
//! 2. Register the job in the store (`Created`)
//! 3. Approval tokens: ensure the allowance (`Authorizing`)
//!    Direct-transfer tokens: move the funds, keep the transfer id as evidence
//! 4. Submit the intent to the backend (`Submitted`)
//! 5. Start the settlement monitor
//!
//! A submission whose outcome is unknown is never resent with the same
//! amount. The job ends `TimedOut` and a new attempt needs a new job and
//! a new local id. Only an explicit `SwapRejected` ends it in `Error`.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::domain::error::SwapError;
use crate::domain::job::{
  JobHandle, JobState, LocalId, StatusHistory, SwapJob, SwapRequest, TransferEvidence,
};
use crate::domain::token::{Amount, TokenCatalog, is_positive};
use crate::ports::backend::{SwapBackend, SwapIntent, SwapRejected};
use crate::ports::clock::Clock;
use crate::ports::ledger::{LedgerGateway, TransferOptions};
use crate::usecases::allowance::AllowancePrecheck;
use crate::usecases::events::{EventBus, NotificationLevel};
use crate::usecases::job_store::{Registration, SwapJobStore};
use crate::usecases::monitor::SettlementMonitor;

/// Basis-point denominator for slippage bounds.
const BPS_DENOMINATOR: u32 = 10_000;

/// Accounts used when paying for swaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitterConfig {
  /// Wallet the ledger gateway signs for. Requests must name it as owner.
  pub owner: String,
  /// Backend account that is approved as spender / receives transfers.
  pub spender: String,
  /// Memo attached to direct transfers.
  pub transfer_memo: Option<String>,
}

/// Entry point for swap requests coming from the UI layer.
pub struct SwapSubmitter {
  catalog: Arc<TokenCatalog>,
  ledger: Arc<dyn LedgerGateway>,
  backend: Arc<dyn SwapBackend>,
  allowance: Arc<AllowancePrecheck>,
  store: Arc<SwapJobStore>,
  monitor: SettlementMonitor,
  events: EventBus,
  clock: Arc<dyn Clock>,
  config: SubmitterConfig,
}

impl SwapSubmitter {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    catalog: Arc<TokenCatalog>,
    ledger: Arc<dyn LedgerGateway>,
    backend: Arc<dyn SwapBackend>,
    allowance: Arc<AllowancePrecheck>,
    store: Arc<SwapJobStore>,
    monitor: SettlementMonitor,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: SubmitterConfig,
  ) -> Self {
    Self {
      catalog,
      ledger,
      backend,
      allowance,
      store,
      monitor,
      events,
      clock,
      config,
    }
  }

  /// Fire-and-forget submission. Validation errors come back right away;
  /// everything after that is observed through the store.
  pub fn submit(self: &Arc<Self>, request: SwapRequest) -> Result<LocalId, SwapError> {
    let job = self.prepare(request)?;
    let local_id = job.local_id;
    let this = Arc::clone(self);
    tokio::spawn(async move {
      if let Err(e) = this.run(job).await {
        warn!(local_id = %local_id, error = %e, "Swap submission ended with error");
      }
    });
    Ok(local_id)
  }

  /// Run the whole submission and return once the backend accepted the job.
  pub async fn execute(&self, request: SwapRequest) -> Result<JobHandle, SwapError> {
    let job = self.prepare(request)?;
    self.run(job).await
  }

  /// Validate a request and build the `Created` job. No I/O.
  pub fn prepare(&self, request: SwapRequest) -> Result<SwapJob, SwapError> {
    let pay_token = self
      .catalog
      .resolve(&request.pay_symbol)
      .ok_or_else(|| SwapError::Validation(format!("unknown token {}", request.pay_symbol)))?
      .clone();
    let receive_token = self
      .catalog
      .resolve(&request.receive_symbol)
      .ok_or_else(|| SwapError::Validation(format!("unknown token {}", request.receive_symbol)))?
      .clone();

    if pay_token.symbol == receive_token.symbol {
      return Err(SwapError::Validation("pay and receive token are the same".into()));
    }
    if request.owner.trim().is_empty() {
      return Err(SwapError::Validation("owner is empty".into()));
    }
    if request.owner != self.config.owner {
      return Err(SwapError::Validation(format!(
        "owner {} is not the wallet this service pays from",
        request.owner
      )));
    }
    if !is_positive(&request.pay_amount) {
      return Err(SwapError::Validation("pay amount must be positive".into()));
    }
    if !is_positive(&request.receive_amount) {
      return Err(SwapError::Validation("receive amount must be positive".into()));
    }

    let min_receive = match request.max_slippage_bps {
      Some(bps) if bps > BPS_DENOMINATOR => {
        return Err(SwapError::Validation(format!(
          "slippage {bps} bps exceeds {BPS_DENOMINATOR}"
        )));
      }
      Some(bps) => Some(min_receive(&request.receive_amount, bps)),
      None => None,
    };

    Ok(SwapJob {
      local_id: request.local_id.unwrap_or_default(),
      job_id: None,
      owner: request.owner,
      pay_token,
      receive_token,
      pay_amount: request.pay_amount,
      receive_amount: request.receive_amount,
      min_receive,
      state: JobState::Created,
      status_history: StatusHistory::default(),
      evidence: None,
      error: None,
      created_at: self.clock.now(),
      completed_at: None,
    })
  }

  #[instrument(skip(self, job), fields(local_id = %job.local_id, pay = %job.pay_token.symbol, receive = %job.receive_token.symbol))]
  async fn run(&self, job: SwapJob) -> Result<JobHandle, SwapError> {
    let job = match self.store.create(job).await {
      Registration::Created(job) => job,
      Registration::Existing(existing) => {
        info!("Local id already submitted, returning existing handle");
        return Ok(JobHandle {
          local_id: existing.local_id,
          job_id: existing.job_id.clone(),
        });
      }
    };
    let local_id = job.local_id;
    let pay = &job.pay_token;

    let evidence = if pay.requires_approval() {
      self.store.update(local_id, |j| j.state = JobState::Authorizing).await?;
      if let Err(e) = self
        .allowance
        .ensure_allowance(pay, &job.owner, &self.config.spender, &job.pay_amount)
        .await
      {
        return Err(self.fail(&job, e).await);
      }
      None
    } else {
      let opts = TransferOptions {
        memo: self.config.transfer_memo.as_ref().map(|m| m.as_bytes().to_vec()),
        created_at: Some(self.clock.now()),
      };
      match self
        .ledger
        .transfer(pay, &self.config.spender, &job.pay_amount, &opts)
        .await
      {
        Ok(transfer_id) => {
          info!(transfer_id = %transfer_id, "Pay token transferred");
          let evidence = TransferEvidence {
            ledger: pay.ledger.clone(),
            transfer_id,
          };
          let recorded = evidence.clone();
          self.store.update(local_id, |j| j.evidence = Some(recorded)).await?;
          Some(evidence)
        }
        Err(e) => {
          let err = SwapError::Transfer {
            token: pay.symbol.clone(),
            reason: format!("{e:#}"),
          };
          return Err(self.fail(&job, err).await);
        }
      }
    };

    let intent = SwapIntent {
      pay_token: pay.symbol.clone(),
      pay_amount: job.pay_amount.clone(),
      receive_token: job.receive_token.symbol.clone(),
      receive_address: job.owner.clone(),
      min_receive: job.min_receive.clone(),
      evidence: evidence.clone(),
    };

    let job_id = match self.backend.submit_swap(&intent).await {
      Ok(job_id) => job_id,
      Err(e) => {
        let Some(rejected) = e.downcast_ref::<SwapRejected>() else {
          self.consume_grant(&job).await;
          let reason = format!("{e:#}");
          return Err(self.outcome_unknown(&job, evidence.as_ref(), reason).await);
        };
        if let Some(evidence) = &evidence {
          // Funds already moved; the backend holds them until refunded.
          warn!(
            transfer_id = %evidence.transfer_id,
            "Swap rejected after pay transfer, funds need a refund"
          );
        }
        let err = SwapError::Submission(rejected.reason.clone());
        return Err(self.fail(&job, err).await);
      }
    };
    self.consume_grant(&job).await;

    let submitted_id = job_id.clone();
    self
      .store
      .update(local_id, |j| {
        j.job_id = Some(submitted_id);
        j.state = JobState::Submitted;
      })
      .await?;
    info!(job_id = %job_id, "Swap submitted");
    self.events.info(Some(local_id), format!("Swap submitted: {}", job.label()));

    if let Err(e) = self.monitor.start(&job_id).await {
      warn!(job_id = %job_id, error = %e, "Settlement monitor not started");
      return Err(e);
    }

    Ok(JobHandle {
      local_id,
      job_id: Some(job_id),
    })
  }

  /// The backend may pull the grant now; stop trusting that much of it.
  async fn consume_grant(&self, job: &SwapJob) {
    if job.pay_token.requires_approval() {
      self
        .allowance
        .consume(&job.pay_token, &job.owner, &self.config.spender, &job.pay_amount)
        .await;
    }
  }

  /// The intent went out but no verdict came back. End the job as
  /// `TimedOut` and tell the user to confirm before trying again.
  async fn outcome_unknown(
    &self,
    job: &SwapJob,
    evidence: Option<&TransferEvidence>,
    reason: String,
  ) -> SwapError {
    let err = SwapError::SubmissionUnknown(reason);
    error!(
      local_id = %job.local_id,
      transfer_id = ?evidence.map(|e| &e.transfer_id),
      error = %err,
      "Swap submission outcome unknown"
    );
    let text = err.to_string();
    if let Err(e) = self
      .store
      .update(job.local_id, |j| {
        j.state = JobState::TimedOut;
        j.error = Some(text);
      })
      .await
    {
      warn!(error = %e, "Could not record unknown submission outcome");
    }
    self.events.notify(
      NotificationLevel::Info,
      Some(job.local_id),
      format!("{}: submission outcome unknown, check your balances before retrying", job.label()),
      0,
    );
    err
  }

  /// Move the job to `Error`, notify, and hand the error back.
  async fn fail(&self, job: &SwapJob, err: SwapError) -> SwapError {
    if err.is_local() {
      warn!(local_id = %job.local_id, error = %err, "Swap not authorized");
    } else {
      error!(local_id = %job.local_id, error = %err, "Swap submission failed");
    }
    let reason = err.to_string();
    if let Err(e) = self
      .store
      .update(job.local_id, |j| {
        j.state = JobState::Error;
        j.error = Some(reason);
      })
      .await
    {
      warn!(error = %e, "Could not record submission failure");
    }
    self
      .events
      .error(Some(job.local_id), format!("Swap {} failed: {err}", job.label()));
    err
  }
}

/// Floor of `receive * (10_000 - bps) / 10_000`.
pub fn min_receive(receive: &Amount, bps: u32) -> Amount {
  let bps = bps.min(BPS_DENOMINATOR);
  receive * (BPS_DENOMINATOR - bps) / BPS_DENOMINATOR
}
