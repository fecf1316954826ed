//! Metrics and Monitoring Adapters
//!
//! Prometheus counters derived from job updates and events, plus the
//! readiness flag served on /ready.

pub mod health;
pub mod prometheus;

pub use health::HealthState;
pub use prometheus::MetricsRegistry;
