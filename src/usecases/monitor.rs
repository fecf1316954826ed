//! Settlement Monitor - Swap Job Status Polling
//!
//! Drives a submitted job to a terminal state by polling the backend:
//!
//! ```text
//! Polling -> Success   typed payload reports "Success"
//!         -> Failed    a status string contains "failed"
//!         -> TimedOut  attempt budget spent, outcome unknown
//!         -> Error     transport failed on N consecutive polls
//! ```
//!
//! One loop per job id. Starting a monitor for an id that already has
//! one cancels the old loop and revokes its store lease before the new
//! loop is armed, all under the same lock. `stop_all` closes the
//! registry for good, so a submission still in flight at shutdown cannot
//! arm a new loop afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::error::SwapError;
use crate::domain::job::{JobId, JobState, SwapJob};
use crate::domain::status::{JobStatusReport, PollVerdict, classify, is_failure_status};
use crate::ports::backend::SwapBackend;
use crate::usecases::events::{EventBus, NotificationLevel, SwapEvent};
use crate::usecases::job_store::{MonitorLease, SwapJobStore};
use crate::usecases::reconciler::BalanceReconciler;

/// Poll cadence and budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
  /// Delay before each status poll.
  pub poll_interval: Duration,
  /// Polls before giving up with `TimedOut`.
  pub max_attempts: u32,
  /// Consecutive transport failures before giving up with `Error`.
  pub max_consecutive_transport_errors: u32,
}

impl Default for MonitorConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(300),
      max_attempts: 100,
      max_consecutive_transport_errors: 3,
    }
  }
}

/// How a monitor loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopExit {
  /// Stopped, superseded, or the job was purged. Nothing more to write.
  Cancelled,
  Finished(JobState),
}

/// The single armed timer for one job id.
struct ActiveMonitor {
  generation: u64,
  cancel_tx: watch::Sender<bool>,
  task: JoinHandle<()>,
}

impl ActiveMonitor {
  fn cancel(self) {
    let _ = self.cancel_tx.send(true);
    self.task.abort();
  }
}

#[derive(Default)]
struct Registry {
  active: HashMap<JobId, ActiveMonitor>,
  next_generation: u64,
  closed: bool,
}

struct Shared {
  backend: Arc<dyn SwapBackend>,
  store: Arc<SwapJobStore>,
  reconciler: Arc<BalanceReconciler>,
  events: EventBus,
  config: MonitorConfig,
  registry: Mutex<Registry>,
}

/// Owns every poll loop. Cheap to clone.
#[derive(Clone)]
pub struct SettlementMonitor {
  shared: Arc<Shared>,
}

impl SettlementMonitor {
  pub fn new(
    backend: Arc<dyn SwapBackend>,
    store: Arc<SwapJobStore>,
    reconciler: Arc<BalanceReconciler>,
    events: EventBus,
    config: MonitorConfig,
  ) -> Self {
    Self {
      shared: Arc::new(Shared {
        backend,
        store,
        reconciler,
        events,
        config,
        registry: Mutex::new(Registry::default()),
      }),
    }
  }

  /// Start polling `job_id`, replacing any loop already running for it.
  #[instrument(skip(self))]
  pub async fn start(&self, job_id: &str) -> Result<(), SwapError> {
    let job = self
      .shared
      .store
      .get_by_job_id(job_id)
      .await
      .ok_or_else(|| SwapError::UnknownJob(job_id.to_string()))?;
    if job.state.is_terminal() {
      return Err(SwapError::IllegalTransition {
        from: job.state,
        to: JobState::Polling,
      });
    }

    let mut registry = self.shared.registry.lock().await;
    if registry.closed {
      return Err(SwapError::ShuttingDown);
    }
    if let Some(prior) = registry.active.remove(job_id) {
      debug!(generation = prior.generation, "Replacing running monitor");
      prior.cancel();
    }
    // Revokes the prior loop's lease as well.
    let lease = self.shared.store.acquire_lease(job.local_id).await?;

    registry.next_generation += 1;
    let generation = registry.next_generation;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let shared = Arc::clone(&self.shared);
    let id = job_id.to_string();
    let task = tokio::spawn(async move {
      let exit = shared.run(&id, &lease, cancel_rx).await;
      shared.finish(&id, generation, &lease, exit).await;
    });

    registry.active.insert(
      job_id.to_string(),
      ActiveMonitor {
        generation,
        cancel_tx,
        task,
      },
    );
    info!(generation, "Settlement monitor started");
    Ok(())
  }

  /// Cancel polling for `job_id`. Returns `false` if nothing was running.
  pub async fn stop(&self, job_id: &str) -> bool {
    let prior = self.shared.registry.lock().await.active.remove(job_id);
    let Some(prior) = prior else {
      return false;
    };
    prior.cancel();
    if let Some(job) = self.shared.store.get_by_job_id(job_id).await {
      self.shared.store.revoke_lease(job.local_id).await;
    }
    info!(job_id, "Settlement monitor stopped");
    true
  }

  /// Cancel every running loop and refuse new ones (shutdown).
  pub async fn stop_all(&self) -> usize {
    let ids: Vec<JobId> = {
      let mut registry = self.shared.registry.lock().await;
      registry.closed = true;
      registry.active.keys().cloned().collect()
    };
    let mut stopped = 0;
    for id in ids {
      if self.stop(&id).await {
        stopped += 1;
      }
    }
    stopped
  }

  pub async fn is_active(&self, job_id: &str) -> bool {
    self.shared.registry.lock().await.active.contains_key(job_id)
  }

  /// Number of armed poll loops.
  pub async fn active_count(&self) -> usize {
    self.shared.registry.lock().await.active.len()
  }
}

impl Shared {
  async fn run(
    &self,
    job_id: &str,
    lease: &MonitorLease,
    mut cancel_rx: watch::Receiver<bool>,
  ) -> LoopExit {
    match self.store.update_leased(lease, |job| job.state = JobState::Polling).await {
      Ok(Some(_)) => {}
      Ok(None) => return LoopExit::Cancelled,
      Err(e) => {
        warn!(job_id, error = %e, "Cannot enter polling");
        return LoopExit::Cancelled;
      }
    }

    let mut attempts = 0u32;
    let mut consecutive_errors = 0u32;
    let ids = [job_id.to_string()];

    loop {
      if attempts >= self.config.max_attempts {
        return self.time_out(lease, attempts).await;
      }

      tokio::select! {
        biased;
        changed = cancel_rx.changed() => {
          if changed.is_err() || *cancel_rx.borrow() {
            return LoopExit::Cancelled;
          }
          continue;
        }
        _ = tokio::time::sleep(self.config.poll_interval) => {}
      }

      attempts += 1;
      match self.backend.job_status(&ids).await {
        Ok(reports) => {
          consecutive_errors = 0;
          self.events.emit(SwapEvent::PollAttempt {
            local_id: lease.local_id(),
            job_id: job_id.to_string(),
            attempt: attempts,
            transport_error: false,
          });
          let report = reports.into_iter().next().unwrap_or_default();
          if let Some(exit) = self.apply_report(lease, report).await {
            return exit;
          }
        }
        Err(e) => {
          consecutive_errors += 1;
          self.events.emit(SwapEvent::PollAttempt {
            local_id: lease.local_id(),
            job_id: job_id.to_string(),
            attempt: attempts,
            transport_error: true,
          });
          warn!(
            job_id,
            attempt = attempts,
            consecutive = consecutive_errors,
            error = %e,
            "Status poll failed"
          );
          if consecutive_errors >= self.config.max_consecutive_transport_errors {
            let err = SwapError::PollTransport(format!("{e:#}"));
            return self.give_up(lease, err).await;
          }
        }
      }
    }
  }

  /// Fold one poll response into the job. `Some` ends the loop.
  async fn apply_report(&self, lease: &MonitorLease, report: JobStatusReport) -> Option<LoopExit> {
    let mut verdict = None;
    let written = self
      .store
      .update_leased(lease, |job| {
        let v = classify(&report, &job.status_history);
        for status in v.new_statuses() {
          job.status_history.record(status);
        }
        match &v {
          PollVerdict::Failed { reason, .. } => {
            job.state = JobState::Failed;
            job.error = Some(SwapError::BackendReported(reason.clone()).to_string());
          }
          PollVerdict::Succeeded { payload, .. } => {
            job.state = JobState::Success;
            if let Some(received) = &payload.receive_amount {
              job.receive_amount = received.clone();
            }
          }
          PollVerdict::Pending { .. } => job.state = JobState::Polling,
        }
        verdict = Some(v);
      })
      .await;

    let job = match written {
      Ok(Some(job)) => job,
      Ok(None) => return Some(LoopExit::Cancelled),
      Err(e) => {
        error!(local_id = %lease.local_id(), error = %e, "Job update rejected");
        return Some(LoopExit::Cancelled);
      }
    };
    let verdict = verdict?;

    for status in verdict.new_statuses() {
      if !is_failure_status(status) {
        self.events.info(Some(job.local_id), status.clone());
      }
    }

    match verdict {
      PollVerdict::Pending { .. } => None,
      PollVerdict::Failed { reason, .. } => {
        warn!(local_id = %job.local_id, reason = %reason, "Swap failed");
        self.events.error(Some(job.local_id), reason);
        Some(LoopExit::Finished(JobState::Failed))
      }
      PollVerdict::Succeeded { .. } => {
        info!(local_id = %job.local_id, "Swap settled");
        self.events.success(Some(job.local_id), success_text(&job));
        // Scheduled, not awaited: reconciliation never reopens the job.
        let _ = self.reconciler.refresh(
          vec![job.pay_token.clone(), job.receive_token.clone()],
          job.owner.clone(),
        );
        Some(LoopExit::Finished(JobState::Success))
      }
    }
  }

  async fn time_out(&self, lease: &MonitorLease, attempts: u32) -> LoopExit {
    let err = SwapError::Timeout { attempts };
    let written = self
      .store
      .update_leased(lease, |job| {
        job.state = JobState::TimedOut;
        job.error = Some(err.to_string());
      })
      .await;
    match written {
      Ok(Some(job)) => {
        warn!(local_id = %job.local_id, attempts, "Swap outcome unknown");
        // Not a failure: the swap may still settle on the backend.
        self.events.notify(
          NotificationLevel::Info,
          Some(job.local_id),
          format!("{}: outcome unknown, check your balances before retrying", job.label()),
          0,
        );
        LoopExit::Finished(JobState::TimedOut)
      }
      _ => LoopExit::Cancelled,
    }
  }

  async fn give_up(&self, lease: &MonitorLease, err: SwapError) -> LoopExit {
    let written = self
      .store
      .update_leased(lease, |job| {
        job.state = JobState::Error;
        job.error = Some(err.to_string());
      })
      .await;
    match written {
      Ok(Some(job)) => {
        error!(local_id = %job.local_id, error = %err, "Settlement monitoring aborted");
        self.events.error(Some(job.local_id), format!("{}: {err}", job.label()));
        LoopExit::Finished(JobState::Error)
      }
      _ => LoopExit::Cancelled,
    }
  }

  /// Deregister the loop unless a newer one already replaced it.
  async fn finish(&self, job_id: &str, generation: u64, lease: &MonitorLease, exit: LoopExit) {
    {
      let mut registry = self.registry.lock().await;
      if registry.active.get(job_id).is_some_and(|m| m.generation == generation) {
        registry.active.remove(job_id);
      }
    }
    self.store.release_lease(lease).await;
    debug!(job_id, generation, exit = ?exit, "Monitor loop exited");
  }
}

fn success_text(job: &SwapJob) -> String {
  format!(
    "Swapped {} for {}",
    job.pay_token.display_amount(&job.pay_amount),
    job.receive_token.display_amount(&job.receive_amount)
  )
}
