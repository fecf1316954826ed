//! Use Cases Layer - Swap Settlement Orchestration
//!
//! Orchestrates domain logic with port interfaces. Each use case owns
//! one step of a swap's life.
//!
//! Use cases:
//! - `AllowancePrecheck`: Approval grants before the backend pulls funds
//! - `SwapSubmitter`: Validation, authorization/transfer, submission
//! - `SettlementMonitor`: Status polling state machine per job id
//! - `SwapJobStore`: Single-writer job records with snapshot reads
//! - `BalanceReconciler`: Post-settlement balance refresh
//! - `EventBus`: Outcome channel consumed by the UI layer

pub mod allowance;
pub mod events;
pub mod job_store;
pub mod monitor;
pub mod reconciler;
pub mod submitter;
