//! Integration Tests - End-to-end Swap Settlement
//!
//! Drives the submitter, allowance precheck, settlement monitor and
//! balance reconciler against mocked ledger and backend ports.
//! Poll timers run on tokio's paused clock, so every test finishes
//! instantly while keeping the real 300 ms cadence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mockall::mock;
use tokio::sync::broadcast;

use swap_settlement::domain::allowance::AllowancePolicy;
use swap_settlement::domain::error::SwapError;
use swap_settlement::domain::job::{JobId, JobState, LocalId, SwapRequest, TransferEvidence};
use swap_settlement::domain::status::{JobStatusReport, TypedStatus};
use swap_settlement::domain::token::{Amount, TokenCatalog, TokenDescriptor, TransferStandard};
use swap_settlement::ports::backend::{SwapBackend, SwapIntent, SwapRejected};
use swap_settlement::ports::clock::{Clock, SystemClock};
use swap_settlement::ports::ledger::{
    ApprovalId, LedgerAllowance, LedgerGateway, TransferId, TransferOptions,
};
use swap_settlement::usecases::allowance::AllowancePrecheck;
use swap_settlement::usecases::events::{EventBus, Notification, NotificationLevel, SwapEvent};
use swap_settlement::usecases::job_store::SwapJobStore;
use swap_settlement::usecases::monitor::{MonitorConfig, SettlementMonitor};
use swap_settlement::usecases::reconciler::{BalanceReconciler, ReconcilerConfig};
use swap_settlement::usecases::submitter::{SubmitterConfig, SwapSubmitter};

// ---- Mock Definitions ----

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl LedgerGateway for Ledger {
        async fn balance_of(&self, token: &TokenDescriptor, owner: &str) -> anyhow::Result<Amount>;

        async fn transfer(
            &self,
            token: &TokenDescriptor,
            to: &str,
            amount: &Amount,
            opts: &TransferOptions,
        ) -> anyhow::Result<TransferId>;

        async fn approve(
            &self,
            token: &TokenDescriptor,
            spender: &str,
            amount: &Amount,
            expires_at: DateTime<Utc>,
        ) -> anyhow::Result<ApprovalId>;

        async fn allowance(
            &self,
            token: &TokenDescriptor,
            owner: &str,
            spender: &str,
        ) -> anyhow::Result<Option<LedgerAllowance>>;
    }
}

mock! {
    pub Backend {}

    #[async_trait::async_trait]
    impl SwapBackend for Backend {
        async fn submit_swap(&self, intent: &SwapIntent) -> anyhow::Result<JobId>;
        async fn job_status(&self, job_ids: &[JobId]) -> anyhow::Result<Vec<JobStatusReport>>;
    }
}

// ---- Fixtures ----

const OWNER: &str = "owner-principal";
const SPENDER: &str = "swap-backend";
const PAY_AMOUNT: u64 = 100_000_000;

fn token(symbol: &str, fee: u64, standard: TransferStandard) -> TokenDescriptor {
    TokenDescriptor {
        symbol: symbol.to_string(),
        decimals: 8,
        ledger: format!("{}-ledger", symbol.to_lowercase()),
        fee: Amount::from(fee),
        standard,
    }
}

fn catalog() -> TokenCatalog {
    TokenCatalog::new([
        token("ICP", 10_000, TransferStandard::Approve),
        token("ckBTC", 10, TransferStandard::Approve),
        token("LEGACY", 100_000, TransferStandard::DirectTransfer),
    ])
}

fn request(pay: &str, receive: &str) -> SwapRequest {
    SwapRequest {
        local_id: None,
        owner: OWNER.to_string(),
        pay_symbol: pay.to_string(),
        pay_amount: Amount::from(PAY_AMOUNT),
        receive_symbol: receive.to_string(),
        receive_amount: Amount::from(1_500u32),
        max_slippage_bps: Some(50),
    }
}

fn pending(statuses: &[&str]) -> JobStatusReport {
    JobStatusReport {
        statuses: statuses.iter().map(|s| s.to_string()).collect(),
        payload: None,
    }
}

fn settled(statuses: &[&str], received: u32) -> JobStatusReport {
    JobStatusReport {
        statuses: statuses.iter().map(|s| s.to_string()).collect(),
        payload: Some(TypedStatus {
            status: "Success".to_string(),
            pay_amount: Some(Amount::from(PAY_AMOUNT)),
            receive_amount: Some(Amount::from(received)),
            tx_id: Some("tx-1".to_string()),
        }),
    }
}

/// Ledger that already holds a large grant and answers balance reads.
fn permissive_ledger() -> MockLedger {
    let mut ledger = MockLedger::new();
    ledger.expect_allowance().returning(|_, _, _| {
        Ok(Some(LedgerAllowance {
            amount: Amount::from(10 * PAY_AMOUNT),
            expires_at: None,
        }))
    });
    ledger
        .expect_balance_of()
        .returning(|_, _| Ok(Amount::from(1u32)));
    ledger
}

/// Backend that accepts every swap as `job-1`.
fn accepting_backend() -> MockBackend {
    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .returning(|_| Ok("job-1".to_string()));
    backend
}

/// Answer status polls from `script(call_number)`; counts calls.
fn scripted_status<F>(backend: &mut MockBackend, calls: Arc<AtomicU32>, script: F)
where
    F: Fn(u32) -> anyhow::Result<JobStatusReport> + Send + 'static,
{
    backend.expect_job_status().returning(move |ids| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let report = script(n)?;
        Ok(ids.iter().map(|_| report.clone()).collect())
    });
}

struct Harness {
    submitter: Arc<SwapSubmitter>,
    store: Arc<SwapJobStore>,
    monitor: SettlementMonitor,
    reconciler: Arc<BalanceReconciler>,
    events: EventBus,
}

fn harness(ledger: MockLedger, backend: MockBackend, monitor_config: MonitorConfig) -> Harness {
    let ledger: Arc<dyn LedgerGateway> = Arc::new(ledger);
    let backend: Arc<dyn SwapBackend> = Arc::new(backend);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = EventBus::default();
    let store = Arc::new(SwapJobStore::new(Arc::clone(&clock)));
    let allowance = Arc::new(AllowancePrecheck::new(
        Arc::clone(&ledger),
        Arc::clone(&clock),
        events.clone(),
        AllowancePolicy::default(),
    ));
    let reconciler = Arc::new(BalanceReconciler::new(
        Arc::clone(&ledger),
        Arc::clone(&clock),
        events.clone(),
        ReconcilerConfig::default(),
    ));
    let monitor = SettlementMonitor::new(
        Arc::clone(&backend),
        Arc::clone(&store),
        Arc::clone(&reconciler),
        events.clone(),
        monitor_config,
    );
    let submitter = Arc::new(SwapSubmitter::new(
        Arc::new(catalog()),
        ledger,
        backend,
        allowance,
        Arc::clone(&store),
        monitor.clone(),
        events.clone(),
        clock,
        SubmitterConfig {
            owner: OWNER.to_string(),
            spender: SPENDER.to_string(),
            transfer_memo: Some("swap".to_string()),
        },
    ));
    Harness {
        submitter,
        store,
        monitor,
        reconciler,
        events,
    }
}

fn drain(rx: &mut broadcast::Receiver<SwapEvent>) -> Vec<SwapEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn notifications(events: &[SwapEvent], level: NotificationLevel) -> Vec<Notification> {
    events
        .iter()
        .filter_map(|e| match e {
            SwapEvent::Notification(n) if n.level == level => Some(n.clone()),
            _ => None,
        })
        .collect()
}

/// Let spawned tasks run to their next timer.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ---- Submission + Settlement ----

#[tokio::test(start_paused = true)]
async fn test_end_to_end_approve_submit_settle() {
    let mut ledger = MockLedger::new();
    ledger.expect_allowance().returning(|_, _, _| Ok(None));
    ledger
        .expect_approve()
        .withf(|token, spender, amount, _| {
            // amount + 4 * fee
            token.symbol == "ICP"
                && spender == SPENDER
                && *amount == Amount::from(PAY_AMOUNT + 40_000)
        })
        .times(1)
        .returning(|_, _, _, _| Ok("approval-1".to_string()));
    let balance_reads = Arc::new(AtomicU32::new(0));
    let reads = Arc::clone(&balance_reads);
    ledger.expect_balance_of().returning(move |token, _| {
        reads.fetch_add(1, Ordering::SeqCst);
        Ok(Amount::from(if token.symbol == "ICP" { 5u32 } else { 1_497u32 }))
    });

    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .withf(|intent| {
            intent.pay_token == "ICP"
                && intent.receive_token == "ckBTC"
                && intent.receive_address == OWNER
                && intent.min_receive == Some(Amount::from(1_492u32))
                && intent.evidence.is_none()
        })
        .times(1)
        .returning(|_| Ok("job-42".to_string()));
    let polls = Arc::new(AtomicU32::new(0));
    scripted_status(&mut backend, Arc::clone(&polls), |n| {
        Ok(match n {
            1 => pending(&["Started"]),
            2 => pending(&["Started", "Swapping"]),
            _ => settled(&["Started", "Swapping", "Success"], 1_497),
        })
    });

    let h = harness(ledger, backend, MonitorConfig::default());
    let mut events = h.events.subscribe();

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    assert_eq!(handle.job_id.as_deref(), Some("job-42"));
    let submitted = h.store.get(handle.local_id).await.unwrap();
    assert!(matches!(submitted.state, JobState::Submitted | JobState::Polling));

    let done = h.store.wait_terminal(handle.local_id).await.unwrap();
    assert_eq!(done.state, JobState::Success);
    assert_eq!(done.receive_amount, Amount::from(1_497u32));
    assert_eq!(
        done.status_history.as_slice(),
        ["Started", "Swapping", "Success"]
    );
    assert!(done.completed_at.is_some());
    assert_eq!(polls.load(Ordering::SeqCst), 3);

    // Immediate read plus re-checks at 1s, 2s and 5s, for both tokens.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(balance_reads.load(Ordering::SeqCst), 8);
    assert_eq!(
        h.reconciler.balance("ckBTC", OWNER).await.unwrap().amount,
        Amount::from(1_497u32)
    );
    assert!(h.reconciler.balance("ICP", OWNER).await.is_some());

    let seen = drain(&mut events);
    assert_eq!(notifications(&seen, NotificationLevel::Success).len(), 1);
    assert!(notifications(&seen, NotificationLevel::Error).is_empty());
    let started = notifications(&seen, NotificationLevel::Info)
        .into_iter()
        .filter(|n| n.text == "Started")
        .count();
    assert_eq!(started, 1, "repeated statuses must notify once");
    assert!(seen.iter().any(|e| matches!(
        e,
        SwapEvent::AllowanceGranted { symbol, .. } if symbol == "ICP"
    )));
    assert!(!h.monitor.is_active("job-42").await);
}

#[tokio::test(start_paused = true)]
async fn test_fire_and_forget_submit_reports_through_store() {
    let mut backend = accepting_backend();
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| {
        Ok(settled(&["Success"], 1_500))
    });
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let local_id = h.submitter.submit(request("ICP", "ckBTC")).unwrap();
    let done = h.store.wait_terminal(local_id).await.unwrap();
    assert_eq!(done.state, JobState::Success);
    assert_eq!(done.job_id.as_deref(), Some("job-1"));
}

#[tokio::test(start_paused = true)]
async fn test_existing_allowance_skips_approval() {
    let mut ledger = permissive_ledger();
    ledger.expect_approve().never();
    let mut backend = accepting_backend();
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| Ok(pending(&[])));
    let h = harness(ledger, backend, MonitorConfig::default());

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    assert_eq!(handle.job_id.as_deref(), Some("job-1"));
    h.monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_direct_transfer_attaches_evidence() {
    let mut ledger = MockLedger::new();
    ledger.expect_allowance().never();
    ledger.expect_approve().never();
    ledger
        .expect_transfer()
        .withf(|token, to, amount, opts| {
            token.symbol == "LEGACY"
                && to == SPENDER
                && *amount == Amount::from(PAY_AMOUNT)
                && opts.memo.as_deref() == Some(b"swap".as_slice())
        })
        .times(1)
        .returning(|_, _, _, _| Ok("7781".to_string()));

    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .withf(|intent| {
            intent.evidence
                == Some(TransferEvidence {
                    ledger: "legacy-ledger".to_string(),
                    transfer_id: "7781".to_string(),
                })
        })
        .times(1)
        .returning(|_| Ok("job-9".to_string()));
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| Ok(pending(&["Queued"])));

    let h = harness(ledger, backend, MonitorConfig::default());
    let mut updates = h.store.subscribe();

    let handle = h.submitter.execute(request("LEGACY", "ICP")).await.unwrap();
    let job = h.store.get(handle.local_id).await.unwrap();
    assert_eq!(job.evidence.as_ref().unwrap().transfer_id, "7781");

    let mut states = Vec::new();
    while let Ok(job) = updates.try_recv() {
        states.push(job.state);
    }
    assert!(!states.contains(&JobState::Authorizing));
    h.monitor.stop_all().await;
}

// ---- Failure Modes ----

#[tokio::test(start_paused = true)]
async fn test_failure_status_stops_polling() {
    let mut backend = accepting_backend();
    let polls = Arc::new(AtomicU32::new(0));
    scripted_status(&mut backend, Arc::clone(&polls), |_| {
        Ok(pending(&["Started", "Swap Failed: insufficient liquidity"]))
    });
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());
    let mut events = h.events.subscribe();

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    let done = h.store.wait_terminal(handle.local_id).await.unwrap();
    assert_eq!(done.state, JobState::Failed);
    assert_eq!(
        done.error.as_deref(),
        Some("Swap Failed: insufficient liquidity")
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(polls.load(Ordering::SeqCst), 1);

    let seen = drain(&mut events);
    let errors = notifications(&seen, NotificationLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].text, "Swap Failed: insufficient liquidity");
    assert_eq!(errors[0].duration_ms, 0, "errors are sticky");
    assert!(notifications(&seen, NotificationLevel::Success).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_attempt_budget_exhausted_times_out() {
    let mut backend = accepting_backend();
    let polls = Arc::new(AtomicU32::new(0));
    scripted_status(&mut backend, Arc::clone(&polls), |_| Ok(pending(&["Pending"])));
    let config = MonitorConfig {
        max_attempts: 5,
        ..MonitorConfig::default()
    };
    let h = harness(permissive_ledger(), backend, config);
    let mut events = h.events.subscribe();

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    let done = h.store.wait_terminal(handle.local_id).await.unwrap();
    settle().await;

    assert_eq!(done.state, JobState::TimedOut);
    assert_eq!(polls.load(Ordering::SeqCst), 5);

    let seen = drain(&mut events);
    assert!(notifications(&seen, NotificationLevel::Error).is_empty());
    let unknown: Vec<_> = notifications(&seen, NotificationLevel::Info)
        .into_iter()
        .filter(|n| n.text.contains("outcome unknown"))
        .collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].duration_ms, 0);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_transport_errors_abort_monitoring() {
    let mut backend = accepting_backend();
    let polls = Arc::new(AtomicU32::new(0));
    scripted_status(&mut backend, Arc::clone(&polls), |_| {
        Err(anyhow::anyhow!("connection reset"))
    });
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    let done = h.store.wait_terminal(handle.local_id).await.unwrap();

    assert_eq!(done.state, JobState::Error);
    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert!(done.error.as_deref().unwrap().contains("connection reset"));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_streak_resets_on_success() {
    let mut backend = accepting_backend();
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |n| match n {
        1 | 2 | 4 | 5 => Err(anyhow::anyhow!("timeout")),
        3 => Ok(pending(&["Started"])),
        _ => Ok(settled(&["Started", "Success"], 1_500)),
    });
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    let done = h.store.wait_terminal(handle.local_id).await.unwrap();
    assert_eq!(done.state, JobState::Success);
}

#[tokio::test(start_paused = true)]
async fn test_validation_rejects_before_any_network_call() {
    // No expectations: any port call panics.
    let h = harness(MockLedger::new(), MockBackend::new(), MonitorConfig::default());

    let unknown = h.submitter.execute(request("DOGE", "ICP")).await;
    assert!(matches!(unknown, Err(SwapError::Validation(_))));

    let same = h.submitter.execute(request("ICP", "ICP")).await;
    assert!(matches!(same, Err(SwapError::Validation(_))));

    let mut zero = request("ICP", "ckBTC");
    zero.pay_amount = Amount::from(0u32);
    assert!(matches!(h.submitter.submit(zero), Err(SwapError::Validation(_))));

    let mut slippage = request("ICP", "ckBTC");
    slippage.max_slippage_bps = Some(10_001);
    assert!(matches!(
        h.submitter.execute(slippage).await,
        Err(SwapError::Validation(_))
    ));

    // The gateway only signs for OWNER; another account cannot pay.
    let mut foreign = request("ICP", "ckBTC");
    foreign.owner = "alice".to_string();
    assert!(matches!(
        h.submitter.execute(foreign).await,
        Err(SwapError::Validation(_))
    ));

    assert!(h.store.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_authorization_failure_marks_error_without_submission() {
    let mut ledger = MockLedger::new();
    ledger.expect_allowance().returning(|_, _, _| Ok(None));
    ledger
        .expect_approve()
        .times(1)
        .returning(|_, _, _, _| Err(anyhow::anyhow!("InsufficientFunds")));
    let mut backend = MockBackend::new();
    backend.expect_submit_swap().never();
    let h = harness(ledger, backend, MonitorConfig::default());
    let mut events = h.events.subscribe();

    let result = h.submitter.execute(request("ICP", "ckBTC")).await;
    assert!(matches!(result, Err(SwapError::Authorization { .. })));

    let jobs = h.store.list().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Error);
    assert!(jobs[0].job_id.is_none());

    let errors = notifications(&drain(&mut events), NotificationLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].duration_ms, 0);
}

#[tokio::test(start_paused = true)]
async fn test_backend_rejection_marks_error() {
    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .times(1)
        .returning(|_| Err(SwapRejected::new("pool paused").into()));
    backend.expect_job_status().never();
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let result = h.submitter.execute(request("ICP", "ckBTC")).await;
    assert!(matches!(result, Err(SwapError::Submission(_))));
    let jobs = h.store.list().await;
    assert_eq!(jobs[0].state, JobState::Error);
    assert!(jobs[0].error.as_deref().unwrap().contains("pool paused"));
}

#[tokio::test(start_paused = true)]
async fn test_lost_submission_reply_is_unknown_outcome() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_transfer()
        .times(1)
        .returning(|_, _, _, _| Ok("7781".to_string()));
    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("POST /swaps: operation timed out")));
    backend.expect_job_status().never();
    let h = harness(ledger, backend, MonitorConfig::default());
    let mut events = h.events.subscribe();

    let result = h.submitter.execute(request("LEGACY", "ICP")).await;
    assert!(matches!(result, Err(SwapError::SubmissionUnknown(_))));

    let jobs = h.store.list().await;
    assert_eq!(jobs[0].state, JobState::TimedOut);
    assert_eq!(jobs[0].evidence.as_ref().unwrap().transfer_id, "7781");
    let error = jobs[0].error.as_deref().unwrap();
    assert!(error.contains("outcome unknown"));
    assert!(!error.contains("rejected"));

    let seen = drain(&mut events);
    assert!(notifications(&seen, NotificationLevel::Error).is_empty());
    let unknown: Vec<_> = notifications(&seen, NotificationLevel::Info)
        .into_iter()
        .filter(|n| n.text.contains("outcome unknown"))
        .collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].duration_ms, 0);
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_swaps_reapprove_spent_grant() {
    let mut ledger = MockLedger::new();
    // The backend pulls the whole grant; the ledger shows nothing left.
    ledger.expect_allowance().times(2).returning(|_, _, _| Ok(None));
    ledger
        .expect_approve()
        .times(2)
        .returning(|_, _, _, _| Ok("approval".to_string()));

    let mut backend = MockBackend::new();
    let submitted = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&submitted);
    backend.expect_submit_swap().times(2).returning(move |_| {
        Ok(format!("job-{}", counter.fetch_add(1, Ordering::SeqCst) + 1))
    });
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| Ok(pending(&[])));
    let h = harness(ledger, backend, MonitorConfig::default());

    let first = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    let second = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    assert_eq!(first.job_id.as_deref(), Some("job-1"));
    assert_eq!(second.job_id.as_deref(), Some("job-2"));
    h.monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_submission_racing_shutdown_arms_no_monitor() {
    let mut backend = accepting_backend();
    backend.expect_job_status().never();
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    h.monitor.stop_all().await;
    let result = h.submitter.execute(request("ICP", "ckBTC")).await;
    assert!(matches!(result, Err(SwapError::ShuttingDown)));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.monitor.active_count().await, 0);
    let jobs = h.store.list().await;
    assert_eq!(jobs[0].state, JobState::Submitted);
}

// ---- Monitor Lifecycle ----

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_keeps_state() {
    let mut backend = accepting_backend();
    let polls = Arc::new(AtomicU32::new(0));
    scripted_status(&mut backend, Arc::clone(&polls), |_| Ok(pending(&["Pending"])));
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(h.monitor.is_active("job-1").await);

    assert!(h.monitor.stop("job-1").await);
    assert!(!h.monitor.stop("job-1").await);
    assert!(!h.monitor.stop("never-started").await);

    let frozen = polls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(polls.load(Ordering::SeqCst), frozen);

    let job = h.store.get(handle.local_id).await.unwrap();
    assert_eq!(job.state, JobState::Polling);
    assert_eq!(h.monitor.active_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_running_monitor() {
    let mut backend = accepting_backend();
    let polls = Arc::new(AtomicU32::new(0));
    scripted_status(&mut backend, Arc::clone(&polls), |_| Ok(pending(&["Pending"])));
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;

    let before = polls.load(Ordering::SeqCst);
    h.monitor.start("job-1").await.unwrap();
    assert_eq!(h.monitor.active_count().await, 1);

    // One loop at 300 ms cadence: polls at 300, 600, ..., 3000.
    tokio::time::sleep(Duration::from_millis(3_150)).await;
    assert_eq!(polls.load(Ordering::SeqCst) - before, 10);
    assert_eq!(h.monitor.active_count().await, 1);
    h.monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_rejects_unknown_and_finished_jobs() {
    let mut backend = accepting_backend();
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| {
        Ok(settled(&["Success"], 1_500))
    });
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    assert!(matches!(
        h.monitor.start("nope").await,
        Err(SwapError::UnknownJob(_))
    ));

    let handle = h.submitter.execute(request("ICP", "ckBTC")).await.unwrap();
    h.store.wait_terminal(handle.local_id).await.unwrap();
    assert!(matches!(
        h.monitor.start("job-1").await,
        Err(SwapError::IllegalTransition { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reused_local_id_returns_existing_handle() {
    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .times(1)
        .returning(|_| Ok("job-1".to_string()));
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| Ok(pending(&[])));
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let local_id = LocalId::new();
    let mut req = request("ICP", "ckBTC");
    req.local_id = Some(local_id);

    let first = h.submitter.execute(req.clone()).await.unwrap();
    let second = h.submitter.execute(req).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.local_id, local_id);
    assert_eq!(h.store.list().await.len(), 1);
    h.monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reuse_of_local_id_submits_once() {
    let mut backend = MockBackend::new();
    backend
        .expect_submit_swap()
        .times(1)
        .returning(|_| Ok("job-1".to_string()));
    scripted_status(&mut backend, Arc::new(AtomicU32::new(0)), |_| Ok(pending(&[])));
    let h = harness(permissive_ledger(), backend, MonitorConfig::default());

    let local_id = LocalId::new();
    let mut req = request("ICP", "ckBTC");
    req.local_id = Some(local_id);

    let (a, b) = tokio::join!(
        h.submitter.execute(req.clone()),
        h.submitter.execute(req)
    );
    assert_eq!(a.unwrap().local_id, local_id);
    assert_eq!(b.unwrap().local_id, local_id);
    assert_eq!(h.store.list().await.len(), 1);
    h.monitor.stop_all().await;
}
