//! Prometheus Metrics Registry - Settlement Observability
//!
//! Counts jobs, polls and approvals for Grafana dashboards. The
//! orchestrator never calls in here: the registry subscribes to the job
//! store broadcast and the event bus and derives everything from them.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::job::{JobState, LocalId, SwapJob};
use crate::usecases::events::{NotificationLevel, SwapEvent};

/// Centralized Prometheus metrics for the settlement service.
///
/// All metrics follow the naming convention `swap_settlement_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Jobs registered in the store.
    pub jobs_created: IntCounter,
    /// Jobs that reached a terminal state, by state.
    pub jobs_finished: IntCounterVec,
    /// Jobs currently between creation and a terminal state.
    pub jobs_in_flight: IntGauge,
    /// Status polls sent.
    pub poll_attempts: IntCounter,
    /// Status polls that failed at the transport level.
    pub poll_transport_errors: IntCounter,
    /// Approval grants obtained, by token.
    pub allowance_grants: IntCounterVec,
    /// Notifications published, by level.
    pub notifications: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let jobs_created = IntCounter::new(
            "swap_settlement_jobs_created_total",
            "Swap jobs registered",
        )?;

        let jobs_finished = IntCounterVec::new(
            Opts::new(
                "swap_settlement_jobs_finished_total",
                "Swap jobs that reached a terminal state",
            ),
            &["state"],
        )?;

        let jobs_in_flight = IntGauge::new(
            "swap_settlement_jobs_in_flight",
            "Swap jobs not yet in a terminal state",
        )?;

        let poll_attempts = IntCounter::new(
            "swap_settlement_poll_attempts_total",
            "Job status polls sent",
        )?;

        let poll_transport_errors = IntCounter::new(
            "swap_settlement_poll_transport_errors_total",
            "Job status polls that failed in transport",
        )?;

        let allowance_grants = IntCounterVec::new(
            Opts::new(
                "swap_settlement_allowance_grants_total",
                "Approval grants obtained",
            ),
            &["token"],
        )?;

        let notifications = IntCounterVec::new(
            Opts::new(
                "swap_settlement_notifications_total",
                "User notifications published",
            ),
            &["level"],
        )?;

        // Register all metrics
        registry.register(Box::new(jobs_created.clone()))?;
        registry.register(Box::new(jobs_finished.clone()))?;
        registry.register(Box::new(jobs_in_flight.clone()))?;
        registry.register(Box::new(poll_attempts.clone()))?;
        registry.register(Box::new(poll_transport_errors.clone()))?;
        registry.register(Box::new(allowance_grants.clone()))?;
        registry.register(Box::new(notifications.clone()))?;

        Ok(Self {
            registry,
            jobs_created,
            jobs_finished,
            jobs_in_flight,
            poll_attempts,
            poll_transport_errors,
            allowance_grants,
            notifications,
        })
    }

    /// Account for one job snapshot given the state last seen for it.
    pub fn record_job(&self, previous: Option<JobState>, job: &SwapJob) {
        if previous.is_none() {
            self.jobs_created.inc();
        }

        let was_live = previous.is_some_and(|s| !s.is_terminal());
        let is_live = !job.state.is_terminal();
        match (was_live, is_live) {
            (false, true) => self.jobs_in_flight.inc(),
            (true, false) => self.jobs_in_flight.dec(),
            _ => {}
        }

        if job.state.is_terminal() && previous.is_none_or(|s| !s.is_terminal()) {
            self.jobs_finished
                .with_label_values(&[job.state.to_string().as_str()])
                .inc();
        }
    }

    /// Account for one published event.
    pub fn record_event(&self, event: &SwapEvent) {
        match event {
            SwapEvent::PollAttempt {
                transport_error, ..
            } => {
                self.poll_attempts.inc();
                if *transport_error {
                    self.poll_transport_errors.inc();
                }
            }
            SwapEvent::AllowanceGranted { symbol, .. } => {
                self.allowance_grants.with_label_values(&[symbol.as_str()]).inc();
            }
            SwapEvent::Notification(n) => {
                let level = match n.level {
                    NotificationLevel::Info => "info",
                    NotificationLevel::Success => "success",
                    NotificationLevel::Error => "error",
                };
                self.notifications.with_label_values(&[level]).inc();
            }
            SwapEvent::BalanceRefreshed { .. } => {}
        }
    }

    /// Follow the job store and event bus until both channels close.
    pub fn observe(
        self: &Arc<Self>,
        mut jobs: broadcast::Receiver<Arc<SwapJob>>,
        mut events: broadcast::Receiver<SwapEvent>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Terminal jobs are dropped; they never change again.
            let mut seen: HashMap<LocalId, JobState> = HashMap::new();
            let mut jobs_open = true;
            let mut events_open = true;

            while jobs_open || events_open {
                tokio::select! {
                    job = jobs.recv(), if jobs_open => match job {
                        Ok(job) => {
                            let previous = seen.get(&job.local_id).copied();
                            this.record_job(previous, &job);
                            if job.state.is_terminal() {
                                seen.remove(&job.local_id);
                            } else {
                                seen.insert(job.local_id, job.state);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Metrics lagged behind job updates");
                        }
                        Err(RecvError::Closed) => jobs_open = false,
                    },
                    event = events.recv(), if events_open => match event {
                        Ok(event) => this.record_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Metrics lagged behind events");
                        }
                        Err(RecvError::Closed) => events_open = false,
                    },
                }
            }
            debug!("Metrics observer stopped");
        })
    }

    /// Render every metric in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
