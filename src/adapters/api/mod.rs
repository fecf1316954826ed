//! Swap Backend and Ledger Gateway API Adapters
//!
//! Implements the outbound HTTP side of the orchestrator: one shared
//! client (signing, retries, rate limiting) and the two port adapters
//! built on top of it.
//!
//! Sub-modules:
//! - `auth`: HMAC-SHA256 request signing
//! - `client`: HTTP client with rate limiting and retries
//! - `ledger`: `LedgerGateway` over HTTP
//! - `swaps`: `SwapBackend` over HTTP
//! - `types`: wire request/response definitions

pub mod auth;
pub mod client;
pub mod ledger;
pub mod swaps;
pub mod types;

pub use client::{ApiClient, ApiClientConfig};
pub use ledger::HttpLedgerGateway;
pub use swaps::HttpSwapBackend;
