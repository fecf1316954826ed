//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `LedgerGateway`: Balances, transfers and approval grants on token ledgers
//! - `SwapBackend`: Swap submission and job status polling
//! - `Clock`: Wall-clock time

pub mod backend;
pub mod clock;
pub mod ledger;
