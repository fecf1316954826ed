//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, file I/O) and exposes the
//! orchestrator to the outside world.
//!
//! Adapter categories:
//! - `api`: swap backend and ledger gateway over HTTP
//! - `metrics`: Prometheus metrics and health state
//! - `persistence`: atomic JSON job history
//! - `server`: inbound axum API for the UI

pub mod api;
pub mod metrics;
pub mod persistence;
pub mod server;
