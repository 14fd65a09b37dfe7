//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};

use super::AppConfig;
use crate::domain::window::MAX_WINDOW_SECS;

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

  parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty endpoints and identifiers
/// - Positive window, interval and timeout values
/// - Ordered timeout/backoff pairs
fn validate_config(config: &AppConfig) -> Result<()> {
  // Exchange validation
  anyhow::ensure!(
    !config.exchange.ws_url.is_empty(),
    "exchange.ws_url must not be empty"
  );
  anyhow::ensure!(
    !config.exchange.product_id.is_empty(),
    "exchange.product_id must not be empty"
  );

  // Prediction validation
  let prediction = &config.prediction;
  anyhow::ensure!(
    !prediction.ws_url.is_empty(),
    "prediction.ws_url must not be empty"
  );
  anyhow::ensure!(
    !prediction.gamma_url.is_empty(),
    "prediction.gamma_url must not be empty"
  );
  anyhow::ensure!(
    !prediction.slug_prefix.is_empty(),
    "prediction.slug_prefix must not be empty"
  );
  anyhow::ensure!(
    prediction.window_seconds > 0,
    "prediction.window_seconds must be positive"
  );
  anyhow::ensure!(
    prediction.window_seconds <= MAX_WINDOW_SECS,
    "prediction.window_seconds ({}) must be <= {}",
    prediction.window_seconds,
    MAX_WINDOW_SECS
  );
  anyhow::ensure!(
    prediction.keep_alive_interval_ms > 0,
    "prediction.keep_alive_interval_ms must be positive"
  );
  anyhow::ensure!(
    prediction.max_malformed_lookups > 0,
    "prediction.max_malformed_lookups must be positive"
  );

  // Connection validation
  let conn = &config.connection;
  anyhow::ensure!(
    conn.stale_timeout_ms > 0,
    "connection.stale_timeout_ms must be positive"
  );
  anyhow::ensure!(
    conn.hard_stale_timeout_ms >= conn.stale_timeout_ms,
    "connection.hard_stale_timeout_ms ({}) must be >= stale_timeout_ms ({})",
    conn.hard_stale_timeout_ms,
    conn.stale_timeout_ms
  );
  anyhow::ensure!(
    conn.reconnect_base_ms > 0 && conn.reconnect_max_ms >= conn.reconnect_base_ms,
    "connection.reconnect_base_ms must be positive and <= reconnect_max_ms"
  );
  anyhow::ensure!(
    conn.resolution_retry_base_ms > 0
      && conn.resolution_retry_max_ms >= conn.resolution_retry_base_ms,
    "connection.resolution_retry_base_ms must be positive and <= resolution_retry_max_ms"
  );

  // Output validation
  anyhow::ensure!(
    config.output.min_interval_ms > 0,
    "output.min_interval_ms must be positive"
  );

  Ok(())
}
