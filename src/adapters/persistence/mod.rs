//! Persistence Adapters - JSON File Storage
//!
//! Finished swap jobs are snapshotted to an atomic JSON file so the
//! history survives restarts. No database dependency.

pub mod history;

pub use history::HistoryStore;
