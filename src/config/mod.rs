//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Token ledgers, backend endpoints and every timing budget are
//! externalized here - nothing is hardcoded in the usecases layer.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::allowance::AllowancePolicy;
use crate::domain::token::{Amount, TokenDescriptor, TransferStandard};
use crate::usecases::monitor::MonitorConfig;
use crate::usecases::reconciler::ReconcilerConfig;
use crate::usecases::submitter::SubmitterConfig;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any swap is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and accounts.
  pub service: ServiceConfig,
  /// Token catalog.
  pub tokens: Vec<TokenConfig>,
  /// Approval sizing.
  #[serde(default)]
  pub allowance: AllowanceConfig,
  /// Status polling budgets.
  #[serde(default)]
  pub monitor: MonitorSection,
  /// Post-settlement balance re-checks.
  #[serde(default)]
  pub reconciler: ReconcilerSection,
  /// Job retention.
  #[serde(default)]
  pub store: StoreConfig,
  /// Backend and ledger endpoints.
  pub api: ApiConfig,
  /// Inbound HTTP server.
  #[serde(default)]
  pub server: ServerConfig,
  /// History persistence.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Wallet account the ledger gateway acts for.
  pub owner: String,
  /// Backend account approved as spender / receiving direct transfers.
  pub spender: String,
  /// Memo attached to direct transfers.
  #[serde(default)]
  pub transfer_memo: Option<String>,
}

/// One catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
  pub symbol: String,
  pub decimals: u8,
  /// Ledger address / canister id.
  pub ledger: String,
  /// Ledger fee in minimal units.
  pub fee: u64,
  pub standard: TransferStandard,
}

impl From<&TokenConfig> for TokenDescriptor {
  fn from(t: &TokenConfig) -> Self {
    Self {
      symbol: t.symbol.clone(),
      decimals: t.decimals,
      ledger: t.ledger.clone(),
      fee: Amount::from(t.fee),
      standard: t.standard,
    }
  }
}

/// Approval sizing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowanceConfig {
  /// New grants cover amount + fee_multiplier * fee.
  #[serde(default = "default_fee_multiplier")]
  pub fee_multiplier: u32,
  /// Existing grants must cover amount + reserve_fee_multiplier * fee.
  #[serde(default = "default_reserve_fee_multiplier")]
  pub reserve_fee_multiplier: u32,
  /// Lifetime of a new grant (seconds).
  #[serde(default = "default_grant_ttl")]
  pub grant_ttl_secs: u64,
}

impl Default for AllowanceConfig {
  fn default() -> Self {
    Self {
      fee_multiplier: default_fee_multiplier(),
      reserve_fee_multiplier: default_reserve_fee_multiplier(),
      grant_ttl_secs: default_grant_ttl(),
    }
  }
}

/// Status polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
  /// Delay between status polls (milliseconds).
  #[serde(default = "default_poll_interval")]
  pub poll_interval_ms: u64,
  /// Polls before the outcome is declared unknown.
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// Consecutive transport failures before the job errors out.
  #[serde(default = "default_transport_errors")]
  pub max_consecutive_transport_errors: u32,
}

impl Default for MonitorSection {
  fn default() -> Self {
    Self {
      poll_interval_ms: default_poll_interval(),
      max_attempts: default_max_attempts(),
      max_consecutive_transport_errors: default_transport_errors(),
    }
  }
}

/// Balance re-check configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerSection {
  /// Offsets after settlement at which balances are re-read (milliseconds).
  #[serde(default = "default_recheck_delays")]
  pub recheck_delays_ms: Vec<u64>,
}

impl Default for ReconcilerSection {
  fn default() -> Self {
    Self {
      recheck_delays_ms: default_recheck_delays(),
    }
  }
}

/// Job retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// How long terminal jobs are kept (seconds).
  #[serde(default = "default_retention")]
  pub retention_secs: u64,
  /// How often expired jobs are purged (seconds).
  #[serde(default = "default_purge_interval")]
  pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      retention_secs: default_retention(),
      purge_interval_secs: default_purge_interval(),
    }
  }
}

/// Outbound API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Swap backend base URL.
  pub backend_url: String,
  /// Ledger gateway base URL.
  pub ledger_url: String,
  /// Request timeout (milliseconds).
  #[serde(default = "default_timeout")]
  pub timeout_ms: u64,
  /// Retries for idempotent reads.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Outbound request budget per second.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
}

/// Inbound HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Bind address for the swap API, health and metrics.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_address(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the job history snapshot.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

impl AppConfig {
  pub fn token_descriptors(&self) -> Vec<TokenDescriptor> {
    self.tokens.iter().map(TokenDescriptor::from).collect()
  }

  pub fn allowance_policy(&self) -> AllowancePolicy {
    AllowancePolicy {
      fee_multiplier: self.allowance.fee_multiplier,
      reserve_fee_multiplier: self.allowance.reserve_fee_multiplier,
      grant_ttl: chrono::Duration::seconds(self.allowance.grant_ttl_secs as i64),
    }
  }

  pub fn monitor_config(&self) -> MonitorConfig {
    MonitorConfig {
      poll_interval: Duration::from_millis(self.monitor.poll_interval_ms),
      max_attempts: self.monitor.max_attempts,
      max_consecutive_transport_errors: self.monitor.max_consecutive_transport_errors,
    }
  }

  pub fn reconciler_config(&self) -> ReconcilerConfig {
    ReconcilerConfig {
      recheck_delays: self
        .reconciler
        .recheck_delays_ms
        .iter()
        .map(|ms| Duration::from_millis(*ms))
        .collect(),
    }
  }

  pub fn submitter_config(&self) -> SubmitterConfig {
    SubmitterConfig {
      owner: self.service.owner.clone(),
      spender: self.service.spender.clone(),
      transfer_memo: self.service.transfer_memo.clone(),
    }
  }

  pub fn retention(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.store.retention_secs as i64)
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_fee_multiplier() -> u32 {
  4
}

fn default_reserve_fee_multiplier() -> u32 {
  1
}

fn default_grant_ttl() -> u64 {
  60
}

fn default_poll_interval() -> u64 {
  300
}

fn default_max_attempts() -> u32 {
  100
}

fn default_transport_errors() -> u32 {
  3
}

fn default_recheck_delays() -> Vec<u64> {
  vec![1_000, 2_000, 5_000]
}

fn default_retention() -> u64 {
  86_400 // 24 h
}

fn default_purge_interval() -> u64 {
  600
}

fn default_timeout() -> u64 {
  10_000
}

fn default_max_retries() -> u32 {
  3
}

fn default_requests_per_second() -> u32 {
  20
}

fn default_bind_address() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}
