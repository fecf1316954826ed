//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    tokens = config.tokens.len(),
    poll_interval_ms = config.monitor.poll_interval_ms,
    max_attempts = config.monitor.max_attempts,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  // Service validation
  anyhow::ensure!(
    !config.service.owner.is_empty(),
    "service.owner must not be empty"
  );
  anyhow::ensure!(
    !config.service.spender.is_empty(),
    "service.spender must not be empty"
  );

  // Token validation
  anyhow::ensure!(
    !config.tokens.is_empty(),
    "At least one token must be configured"
  );

  let mut symbols = HashSet::new();
  for (i, token) in config.tokens.iter().enumerate() {
    anyhow::ensure!(
      !token.symbol.is_empty(),
      "Token {} has empty symbol",
      i
    );
    anyhow::ensure!(
      !token.ledger.is_empty(),
      "Token {} ({}) has empty ledger",
      i,
      token.symbol
    );
    anyhow::ensure!(
      symbols.insert(token.symbol.as_str()),
      "Token symbol {} configured twice",
      token.symbol
    );
  }

  // Allowance validation
  anyhow::ensure!(
    config.allowance.fee_multiplier >= 1,
    "allowance.fee_multiplier must be >= 1, got {}",
    config.allowance.fee_multiplier
  );
  anyhow::ensure!(
    config.allowance.grant_ttl_secs > 0,
    "allowance.grant_ttl_secs must be positive"
  );

  // Monitor validation
  anyhow::ensure!(
    config.monitor.poll_interval_ms > 0,
    "monitor.poll_interval_ms must be positive"
  );
  anyhow::ensure!(
    config.monitor.max_attempts > 0,
    "monitor.max_attempts must be positive"
  );
  anyhow::ensure!(
    config.monitor.max_consecutive_transport_errors > 0,
    "monitor.max_consecutive_transport_errors must be positive"
  );

  // API validation
  anyhow::ensure!(
    !config.api.backend_url.is_empty(),
    "Backend URL must not be empty"
  );
  anyhow::ensure!(
    !config.api.ledger_url.is_empty(),
    "Ledger URL must not be empty"
  );
  anyhow::ensure!(
    config.api.requests_per_second > 0,
    "api.requests_per_second must be positive"
  );

  Ok(())
}
