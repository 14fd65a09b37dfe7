//! Configuration Module - TOML-based Monitor Configuration
//!
//! Loads and validates configuration from `config.toml`. Every endpoint,
//! timeout and market convention is externalized here; nothing about
//! the feeds is hardcoded in the domain layer.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any feed connects.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Process identity and logging.
  pub app: AppSection,
  /// Centralized-exchange order book feed.
  #[serde(default)]
  pub exchange: ExchangeConfig,
  /// Rotating prediction-market feed.
  #[serde(default)]
  pub prediction: PredictionConfig,
  /// Supervisor timeouts and backoff.
  #[serde(default)]
  pub connection: ConnectionConfig,
  /// Output gate and rendering.
  #[serde(default)]
  pub output: OutputConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Log encoding.
  #[serde(default)]
  pub log_format: LogFormat,
}

/// Log encoding for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Json,
  Pretty,
}

/// Coinbase Advanced Trade level2 feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
  /// WebSocket URL.
  #[serde(default = "default_exchange_ws_url")]
  pub ws_url: String,
  /// Product to mirror, e.g. BTC-USD.
  #[serde(default = "default_product_id")]
  pub product_id: String,
  /// Also subscribe to the heartbeats channel.
  #[serde(default = "default_true")]
  pub subscribe_heartbeats: bool,
  /// Resubscribe for a fresh snapshot when sequence numbers skip.
  #[serde(default = "default_true")]
  pub resync_on_gap: bool,
}

/// Polymarket rotating up/down market feed.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionConfig {
  /// CLOB market channel WebSocket URL.
  #[serde(default = "default_prediction_ws_url")]
  pub ws_url: String,
  /// Gamma REST API base URL.
  #[serde(default = "default_gamma_url")]
  pub gamma_url: String,
  /// Slug prefix; the window start is appended.
  #[serde(default = "default_slug_prefix")]
  pub slug_prefix: String,
  /// Window length in seconds.
  #[serde(default = "default_window_seconds")]
  pub window_seconds: u64,
  /// Keep-alive text frame.
  #[serde(default = "default_keep_alive_payload")]
  pub keep_alive_payload: String,
  /// Delay after subscribing before the first keep-alive (ms).
  #[serde(default = "default_keep_alive_settle_ms")]
  pub keep_alive_settle_ms: u64,
  /// Keep-alive interval (ms).
  #[serde(default = "default_keep_alive_interval_ms")]
  pub keep_alive_interval_ms: u64,
  /// Lookup request timeout (ms).
  #[serde(default = "default_lookup_timeout_ms")]
  pub lookup_timeout_ms: u64,
  /// Consecutive malformed lookups before the feed stops.
  #[serde(default = "default_max_malformed_lookups")]
  pub max_malformed_lookups: u32,
}

/// Connection supervision parameters, shared by both feeds.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
  /// WebSocket handshake timeout (ms).
  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,
  /// Silence before a feed is marked degraded (ms).
  #[serde(default = "default_stale_timeout_ms")]
  pub stale_timeout_ms: u64,
  /// Silence before a degraded feed is reconnected (ms).
  #[serde(default = "default_hard_stale_timeout_ms")]
  pub hard_stale_timeout_ms: u64,
  /// First reconnect delay (ms).
  #[serde(default = "default_reconnect_base_ms")]
  pub reconnect_base_ms: u64,
  /// Reconnect delay ceiling (ms).
  #[serde(default = "default_reconnect_max_ms")]
  pub reconnect_max_ms: u64,
  /// First retry delay when no market is published yet (ms).
  #[serde(default = "default_resolution_retry_base_ms")]
  pub resolution_retry_base_ms: u64,
  /// Retry delay ceiling when no market is published yet (ms).
  #[serde(default = "default_resolution_retry_max_ms")]
  pub resolution_retry_max_ms: u64,
}

/// Output gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
  /// Minimum time between two emitted comparisons (ms).
  #[serde(default = "default_min_interval_ms")]
  pub min_interval_ms: u64,
  /// Rendering of emitted comparisons.
  #[serde(default)]
  pub format: OutputFormat,
}

/// How comparisons reach the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// Plain text lines on stdout.
  #[default]
  Text,
  /// Structured tracing events.
  Log,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl ConnectionConfig {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn stale_timeout(&self) -> Duration {
    Duration::from_millis(self.stale_timeout_ms)
  }

  pub fn hard_stale_timeout(&self) -> Duration {
    Duration::from_millis(self.hard_stale_timeout_ms)
  }
}

impl Default for ExchangeConfig {
  fn default() -> Self {
    Self {
      ws_url: default_exchange_ws_url(),
      product_id: default_product_id(),
      subscribe_heartbeats: true,
      resync_on_gap: true,
    }
  }
}

impl Default for PredictionConfig {
  fn default() -> Self {
    Self {
      ws_url: default_prediction_ws_url(),
      gamma_url: default_gamma_url(),
      slug_prefix: default_slug_prefix(),
      window_seconds: default_window_seconds(),
      keep_alive_payload: default_keep_alive_payload(),
      keep_alive_settle_ms: default_keep_alive_settle_ms(),
      keep_alive_interval_ms: default_keep_alive_interval_ms(),
      lookup_timeout_ms: default_lookup_timeout_ms(),
      max_malformed_lookups: default_max_malformed_lookups(),
    }
  }
}

impl Default for ConnectionConfig {
  fn default() -> Self {
    Self {
      connect_timeout_ms: default_connect_timeout_ms(),
      stale_timeout_ms: default_stale_timeout_ms(),
      hard_stale_timeout_ms: default_hard_stale_timeout_ms(),
      reconnect_base_ms: default_reconnect_base_ms(),
      reconnect_max_ms: default_reconnect_max_ms(),
      resolution_retry_base_ms: default_resolution_retry_base_ms(),
      resolution_retry_max_ms: default_resolution_retry_max_ms(),
    }
  }
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      min_interval_ms: default_min_interval_ms(),
      format: OutputFormat::default(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_exchange_ws_url() -> String {
  "wss://advanced-trade-ws.coinbase.com".to_string()
}

fn default_product_id() -> String {
  "BTC-USD".to_string()
}

fn default_prediction_ws_url() -> String {
  "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_gamma_url() -> String {
  "https://gamma-api.polymarket.com".to_string()
}

fn default_slug_prefix() -> String {
  "btc-updown-15m".to_string()
}

fn default_window_seconds() -> u64 {
  900
}

fn default_keep_alive_payload() -> String {
  "PING".to_string()
}

fn default_keep_alive_settle_ms() -> u64 {
  15_000
}

fn default_keep_alive_interval_ms() -> u64 {
  10_000
}

fn default_lookup_timeout_ms() -> u64 {
  10_000
}

fn default_max_malformed_lookups() -> u32 {
  5
}

fn default_connect_timeout_ms() -> u64 {
  10_000
}

fn default_stale_timeout_ms() -> u64 {
  30_000
}

fn default_hard_stale_timeout_ms() -> u64 {
  90_000
}

fn default_reconnect_base_ms() -> u64 {
  500
}

fn default_reconnect_max_ms() -> u64 {
  30_000
}

fn default_resolution_retry_base_ms() -> u64 {
  1_000
}

fn default_resolution_retry_max_ms() -> u64 {
  15_000
}

fn default_min_interval_ms() -> u64 {
  1_000
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
