//! Swap Job Store - Single Owner of Swap Job Records
//!
//! Single writer, many readers: every write takes the store lock,
//! builds a new `SwapJob` and swaps the `Arc` in. Readers only ever get
//! whole snapshots. Each committed write is broadcast to subscribers.
//!
//! Monitor loops write through a `MonitorLease`. Acquiring a new lease
//! for a job revokes the old one, so a loop that was cancelled while a
//! poll was in flight can never write after its replacement started.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::domain::error::SwapError;
use crate::domain::job::{JobId, LocalId, SwapJob};
use crate::ports::clock::Clock;

/// Write permit held by the one monitor loop allowed to update a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorLease {
  local_id: LocalId,
  token: u64,
}

impl MonitorLease {
  pub fn local_id(&self) -> LocalId {
    self.local_id
  }
}

#[derive(Default)]
struct StoreInner {
  jobs: HashMap<LocalId, Arc<SwapJob>>,
  by_job_id: HashMap<JobId, LocalId>,
  leases: HashMap<LocalId, u64>,
  next_lease: u64,
}

impl StoreInner {
  /// Apply `f` to a copy of the job, validate, then commit.
  fn apply<F>(&mut self, local_id: LocalId, f: F, clock: &dyn Clock) -> Result<Arc<SwapJob>, SwapError>
  where
    F: FnOnce(&mut SwapJob),
  {
    let current = self
      .jobs
      .get(&local_id)
      .ok_or_else(|| SwapError::UnknownJob(local_id.to_string()))?;

    let mut next = SwapJob::clone(current);
    f(&mut next);

    if !current.state.can_advance_to(next.state) {
      return Err(SwapError::IllegalTransition {
        from: current.state,
        to: next.state,
      });
    }
    next.local_id = local_id;
    if next.state.is_terminal() {
      next.completed_at.get_or_insert_with(|| clock.now());
    }
    if let Some(job_id) = &next.job_id {
      self.by_job_id.insert(job_id.clone(), local_id);
    }

    let next = Arc::new(next);
    self.jobs.insert(local_id, Arc::clone(&next));
    Ok(next)
  }
}

/// Outcome of `SwapJobStore::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
  Created(Arc<SwapJob>),
  /// The local id was already registered; nothing was written.
  Existing(Arc<SwapJob>),
}

impl Registration {
  pub fn is_new(&self) -> bool {
    matches!(self, Self::Created(_))
  }

  pub fn into_job(self) -> Arc<SwapJob> {
    match self {
      Self::Created(job) | Self::Existing(job) => job,
    }
  }
}

/// In-memory registry of active and historical swap jobs.
pub struct SwapJobStore {
  inner: RwLock<StoreInner>,
  updates: broadcast::Sender<Arc<SwapJob>>,
  clock: Arc<dyn Clock>,
}

impl SwapJobStore {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    let (updates, _) = broadcast::channel(256);
    Self {
      inner: RwLock::new(StoreInner::default()),
      updates,
      clock,
    }
  }

  /// Register a job. A taken local id yields the job already stored
  /// under it, checked and inserted under one lock.
  pub async fn create(&self, job: SwapJob) -> Registration {
    let job = {
      let mut inner = self.inner.write().await;
      if let Some(existing) = inner.jobs.get(&job.local_id) {
        return Registration::Existing(Arc::clone(existing));
      }
      let job = Arc::new(job);
      if let Some(job_id) = &job.job_id {
        inner.by_job_id.insert(job_id.clone(), job.local_id);
      }
      inner.jobs.insert(job.local_id, Arc::clone(&job));
      job
    };
    debug!(local_id = %job.local_id, state = %job.state, "Swap job created");
    self.publish(&job);
    Registration::Created(job)
  }

  /// Mutate a job through `f`. Terminal jobs and backward moves are rejected.
  pub async fn update<F>(&self, local_id: LocalId, f: F) -> Result<Arc<SwapJob>, SwapError>
  where
    F: FnOnce(&mut SwapJob),
  {
    let job = {
      let mut inner = self.inner.write().await;
      inner.apply(local_id, f, self.clock.as_ref())?
    };
    self.publish(&job);
    Ok(job)
  }

  /// Issue a fresh monitor lease, revoking any previous one for the job.
  pub async fn acquire_lease(&self, local_id: LocalId) -> Result<MonitorLease, SwapError> {
    let mut inner = self.inner.write().await;
    if !inner.jobs.contains_key(&local_id) {
      return Err(SwapError::UnknownJob(local_id.to_string()));
    }
    inner.next_lease += 1;
    let token = inner.next_lease;
    inner.leases.insert(local_id, token);
    Ok(MonitorLease { local_id, token })
  }

  /// Drop the lease if it is still the current one.
  pub async fn release_lease(&self, lease: &MonitorLease) {
    let mut inner = self.inner.write().await;
    if inner.leases.get(&lease.local_id) == Some(&lease.token) {
      inner.leases.remove(&lease.local_id);
    }
  }

  /// Revoke whatever lease is outstanding for the job.
  pub async fn revoke_lease(&self, local_id: LocalId) -> bool {
    self.inner.write().await.leases.remove(&local_id).is_some()
  }

  /// Update under a lease. `Ok(None)` means the lease was revoked and
  /// nothing was written.
  pub async fn update_leased<F>(
    &self,
    lease: &MonitorLease,
    f: F,
  ) -> Result<Option<Arc<SwapJob>>, SwapError>
  where
    F: FnOnce(&mut SwapJob),
  {
    let job = {
      let mut inner = self.inner.write().await;
      if inner.leases.get(&lease.local_id) != Some(&lease.token) {
        debug!(local_id = %lease.local_id, "Stale monitor lease, write dropped");
        return Ok(None);
      }
      inner.apply(lease.local_id, f, self.clock.as_ref())?
    };
    self.publish(&job);
    Ok(Some(job))
  }

  pub async fn get(&self, local_id: LocalId) -> Option<Arc<SwapJob>> {
    self.inner.read().await.jobs.get(&local_id).cloned()
  }

  pub async fn get_by_job_id(&self, job_id: &str) -> Option<Arc<SwapJob>> {
    let inner = self.inner.read().await;
    inner
      .by_job_id
      .get(job_id)
      .and_then(|local_id| inner.jobs.get(local_id))
      .cloned()
  }

  /// All jobs, oldest first.
  pub async fn list(&self) -> Vec<Arc<SwapJob>> {
    let mut jobs: Vec<_> = self.inner.read().await.jobs.values().cloned().collect();
    jobs.sort_by_key(|j| j.created_at);
    jobs
  }

  /// Terminal jobs only, oldest first.
  pub async fn history(&self) -> Vec<Arc<SwapJob>> {
    let mut jobs = self.list().await;
    jobs.retain(|j| j.state.is_terminal());
    jobs
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Arc<SwapJob>> {
    self.updates.subscribe()
  }

  /// Resolve once the job reaches a terminal state. `None` if unknown.
  pub async fn wait_terminal(&self, local_id: LocalId) -> Option<Arc<SwapJob>> {
    let mut rx = self.updates.subscribe();
    let job = self.get(local_id).await?;
    if job.state.is_terminal() {
      return Some(job);
    }

    loop {
      match rx.recv().await {
        Ok(job) if job.local_id == local_id && job.state.is_terminal() => return Some(job),
        Ok(_) => continue,
        Err(RecvError::Lagged(skipped)) => {
          warn!(skipped, "Job update subscriber lagged, re-reading store");
          let job = self.get(local_id).await?;
          if job.state.is_terminal() {
            return Some(job);
          }
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }

  /// Re-insert terminal jobs from persisted history; live ids win.
  pub async fn restore(&self, jobs: Vec<SwapJob>) -> usize {
    let mut inner = self.inner.write().await;
    let mut restored = 0;
    for job in jobs.into_iter().filter(|j| j.state.is_terminal()) {
      if inner.jobs.contains_key(&job.local_id) {
        continue;
      }
      if let Some(job_id) = &job.job_id {
        inner.by_job_id.insert(job_id.clone(), job.local_id);
      }
      inner.jobs.insert(job.local_id, Arc::new(job));
      restored += 1;
    }
    restored
  }

  /// Drop terminal jobs completed longer than `retention` ago.
  pub async fn purge_expired(&self, retention: Duration) -> usize {
    let cutoff = self.clock.now() - retention;
    let mut inner = self.inner.write().await;

    let expired: Vec<LocalId> = inner
      .jobs
      .values()
      .filter(|j| j.state.is_terminal() && j.completed_at.is_some_and(|t| t < cutoff))
      .map(|j| j.local_id)
      .collect();

    for local_id in &expired {
      if let Some(job) = inner.jobs.remove(local_id) {
        if let Some(job_id) = &job.job_id {
          inner.by_job_id.remove(job_id);
        }
      }
      inner.leases.remove(local_id);
    }

    if !expired.is_empty() {
      info!(purged = expired.len(), "Expired swap jobs purged");
    }
    expired.len()
  }

  fn publish(&self, job: &Arc<SwapJob>) {
    // No subscribers is normal.
    let _ = self.updates.send(Arc::clone(job));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::job::{JobState, StatusHistory};
  use crate::domain::token::{Amount, TokenDescriptor, TransferStandard};
  use crate::ports::clock::ManualClock;
  use chrono::Utc;

  fn token(symbol: &str) -> TokenDescriptor {
    TokenDescriptor {
      symbol: symbol.into(),
      decimals: 8,
      ledger: format!("{symbol}-ledger"),
      fee: Amount::from(10_000u32),
      standard: TransferStandard::Approve,
    }
  }

  fn job(clock: &ManualClock) -> SwapJob {
    SwapJob {
      local_id: LocalId::new(),
      job_id: None,
      owner: "owner".into(),
      pay_token: token("ICP"),
      receive_token: token("ckBTC"),
      pay_amount: Amount::from(100u32),
      receive_amount: Amount::from(1u32),
      min_receive: None,
      state: JobState::Created,
      status_history: StatusHistory::default(),
      evidence: None,
      error: None,
      created_at: clock.now(),
      completed_at: None,
    }
  }

  fn store() -> (Arc<ManualClock>, SwapJobStore) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = SwapJobStore::new(clock.clone());
    (clock, store)
  }

  #[tokio::test]
  async fn test_create_returns_existing_for_taken_local_id() {
    let (clock, store) = store();
    let j = job(&clock);
    let first = store.create(j.clone()).await;
    assert!(first.is_new());

    let mut retry = j;
    retry.pay_amount = Amount::from(1u32);
    let second = store.create(retry).await;
    assert!(!second.is_new());
    assert_eq!(second.into_job(), first.into_job());
    assert_eq!(store.list().await.len(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_create_registers_once() {
    let (clock, store) = store();
    let j = job(&clock);
    let (a, b) = tokio::join!(store.create(j.clone()), store.create(j));
    assert_ne!(a.is_new(), b.is_new());
    assert_eq!(a.into_job(), b.into_job());
  }

  #[tokio::test]
  async fn test_snapshots_are_immutable() {
    let (clock, store) = store();
    let j = store.create(job(&clock)).await.into_job();
    let before = store.get(j.local_id).await.unwrap();

    store
      .update(j.local_id, |job| {
        job.state = JobState::Submitted;
        job.job_id = Some("42".into());
      })
      .await
      .unwrap();

    assert_eq!(before.state, JobState::Created);
    assert_eq!(store.get(j.local_id).await.unwrap().state, JobState::Submitted);
    assert_eq!(store.get_by_job_id("42").await.unwrap().local_id, j.local_id);
  }

  #[tokio::test]
  async fn test_backward_and_post_terminal_writes_rejected() {
    let (clock, store) = store();
    let j = store.create(job(&clock)).await.into_job();
    store.update(j.local_id, |job| job.state = JobState::Polling).await.unwrap();

    let err = store
      .update(j.local_id, |job| job.state = JobState::Authorizing)
      .await
      .unwrap_err();
    assert!(matches!(err, SwapError::IllegalTransition { .. }));

    let done = store.update(j.local_id, |job| job.state = JobState::Success).await.unwrap();
    assert_eq!(done.completed_at, Some(clock.now()));

    let err = store
      .update(j.local_id, |job| job.error = Some("late".into()))
      .await
      .unwrap_err();
    assert!(matches!(err, SwapError::IllegalTransition { .. }));
    assert!(store.get(j.local_id).await.unwrap().error.is_none());
  }

  #[tokio::test]
  async fn test_revoked_lease_cannot_write() {
    let (clock, store) = store();
    let j = store.create(job(&clock)).await.into_job();

    let old = store.acquire_lease(j.local_id).await.unwrap();
    let new = store.acquire_lease(j.local_id).await.unwrap();

    let dropped = store
      .update_leased(&old, |job| job.state = JobState::Failed)
      .await
      .unwrap();
    assert!(dropped.is_none());

    let written = store
      .update_leased(&new, |job| job.state = JobState::Polling)
      .await
      .unwrap();
    assert_eq!(written.unwrap().state, JobState::Polling);

    assert!(store.revoke_lease(j.local_id).await);
    assert!(!store.revoke_lease(j.local_id).await);
    assert!(store.update_leased(&new, |_| {}).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_purge_expired_keeps_recent_and_active() {
    let (clock, store) = store();
    let active = store.create(job(&clock)).await.into_job();
    let finished = store.create(job(&clock)).await.into_job();
    store
      .update(finished.local_id, |job| job.state = JobState::TimedOut)
      .await
      .unwrap();

    assert_eq!(store.purge_expired(Duration::hours(1)).await, 0);

    clock.advance(Duration::hours(2));
    assert_eq!(store.purge_expired(Duration::hours(1)).await, 1);
    assert!(store.get(finished.local_id).await.is_none());
    assert!(store.get(active.local_id).await.is_some());
  }

  #[tokio::test]
  async fn test_wait_terminal_resolves_on_update() {
    let (clock, store) = store();
    let store = Arc::new(store);
    let j = store.create(job(&clock)).await.into_job();

    let waiter = {
      let store = Arc::clone(&store);
      let id = j.local_id;
      tokio::spawn(async move { store.wait_terminal(id).await })
    };
    tokio::task::yield_now().await;

    store.update(j.local_id, |job| job.state = JobState::Error).await.unwrap();
    let done = waiter.await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Error);
  }

  #[tokio::test]
  async fn test_restore_only_terminal() {
    let (clock, store) = store();
    let mut finished = job(&clock);
    finished.state = JobState::Success;
    finished.job_id = Some("7".into());
    let pending = job(&clock);

    assert_eq!(store.restore(vec![finished.clone(), pending]).await, 1);
    assert_eq!(store.get_by_job_id("7").await.unwrap().local_id, finished.local_id);
    assert_eq!(store.history().await.len(), 1);
  }
}
