//! Gamma HTTP Client - Market Lookup by Slug
//!
//! Wraps reqwest with timeouts and retries for the Gamma events API.
//! Implements the `MarketLookup` port: a missing market is `Ok(None)`,
//! transport trouble is `Http`, an unusable body is `Malformed`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::types::{string_list, GammaEvent};
use crate::config::PredictionConfig;
use crate::ports::market_lookup::{LookupError, MarketDescriptor, MarketLookup};

/// Label used when the market carries no question.
const DEFAULT_LABEL: &str = "BTC 15-min";

/// Configuration for the Gamma HTTP client.
#[derive(Debug, Clone)]
pub struct GammaClientConfig {
  /// Base URL for the Gamma API.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for GammaClientConfig {
  fn default() -> Self {
    Self {
      base_url: "https://gamma-api.polymarket.com".to_string(),
      timeout: Duration::from_secs(10),
      max_retries: 2,
      retry_base_delay: Duration::from_millis(200),
    }
  }
}

impl From<&PredictionConfig> for GammaClientConfig {
  fn from(config: &PredictionConfig) -> Self {
    Self {
      base_url: config.gamma_url.trim_end_matches('/').to_string(),
      timeout: Duration::from_millis(config.lookup_timeout_ms),
      ..Self::default()
    }
  }
}

/// HTTP client for the Gamma events API.
pub struct GammaClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: GammaClientConfig,
}

impl GammaClient {
  /// Create a new Gamma client.
  pub fn new(config: GammaClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(2)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self { http, config })
  }

  /// Fetch the raw event body for `slug`; `None` on 404.
  async fn fetch_event(&self, slug: &str) -> Result<Option<String>, LookupError> {
    let url = format!("{}/events/slug/{}", self.config.base_url, slug);
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying lookup");
        sleep(delay).await;
      }

      // Cache-busting parameter.
      let request = self
        .http
        .get(&url)
        .query(&[("tid", Utc::now().timestamp_millis().to_string())]);

      match request.send().await {
        Ok(response) => match response.status() {
          StatusCode::NOT_FOUND => return Ok(None),
          status if status.is_success() => {
            return response
              .text()
              .await
              .map(Some)
              .map_err(|e| LookupError::Http(format!("reading body: {e}")));
          }
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(slug, "Rate limited by Gamma API, backing off");
            last_error = Some(LookupError::Http("rate limited".to_string()));
          }
          status if status.is_server_error() => {
            warn!(status = %status, slug, "Gamma server error, retrying");
            last_error = Some(LookupError::Http(format!("server error: {status}")));
          }
          status => {
            return Err(LookupError::Http(format!("unexpected status {status}")));
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, slug, "Lookup request failed");
          last_error = Some(LookupError::Http(e.to_string()));
        }
      }
    }

    Err(last_error.unwrap_or_else(|| LookupError::Http("max retries exceeded".to_string())))
  }
}

/// Interpret a Gamma event body.
///
/// An empty market list or a market without token ids means the market
/// is not published yet. Token ids that are present but unusable are
/// malformed. The "up" token is located through `outcomes` when given,
/// otherwise it is the first id.
pub fn parse_event(body: &str) -> Result<Option<MarketDescriptor>, LookupError> {
  let event: GammaEvent = serde_json::from_str(body)
    .map_err(|e| LookupError::Malformed(format!("event body: {e}")))?;

  let Some(market) = event.markets.into_iter().next() else {
    return Ok(None);
  };
  let Some(raw_ids) = market.clob_token_ids.as_ref() else {
    return Ok(None);
  };

  let ids = string_list(raw_ids)
    .ok_or_else(|| LookupError::Malformed(format!("clobTokenIds not a list: {raw_ids}")))?;
  let [first, second]: [String; 2] = ids
    .try_into()
    .map_err(|ids: Vec<String>| {
      LookupError::Malformed(format!("expected 2 clobTokenIds, got {}", ids.len()))
    })?;
  if first.is_empty() || second.is_empty() || first == second {
    return Err(LookupError::Malformed("clobTokenIds not two distinct ids".to_string()));
  }

  let down_first = market
    .outcomes
    .as_ref()
    .and_then(string_list)
    .and_then(|outcomes| outcomes.first().cloned())
    .is_some_and(|name| name.eq_ignore_ascii_case("down"));
  let token_ids = if down_first { [second, first] } else { [first, second] };

  let label = market
    .question
    .filter(|q| !q.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_LABEL.to_string());

  Ok(Some(MarketDescriptor { token_ids, label }))
}

#[async_trait]
impl MarketLookup for GammaClient {
  #[instrument(skip(self))]
  async fn lookup(&self, slug: &str) -> Result<Option<MarketDescriptor>, LookupError> {
    match self.fetch_event(slug).await? {
      Some(body) => parse_event(&body),
      None => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_event_encoded_ids() {
    let body = r#"{
      "slug": "btc-updown-15m-1700000100",
      "markets": [{
        "question": "Bitcoin Up or Down - 12:00PM ET",
        "clobTokenIds": "[\"111\", \"222\"]",
        "outcomes": "[\"Up\", \"Down\"]"
      }]
    }"#;
    let market = parse_event(body).unwrap().unwrap();
    assert_eq!(market.token_ids, ["111".to_string(), "222".to_string()]);
    assert_eq!(market.label, "Bitcoin Up or Down - 12:00PM ET");
  }

  #[test]
  fn test_parse_event_orders_by_outcome_names() {
    let body = r#"{"markets":[{"clobTokenIds":["111","222"],"outcomes":["Down","Up"]}]}"#;
    let market = parse_event(body).unwrap().unwrap();
    assert_eq!(market.token_ids, ["222".to_string(), "111".to_string()]);
    assert_eq!(market.label, DEFAULT_LABEL);
  }

  #[test]
  fn test_parse_event_not_published() {
    assert_eq!(parse_event(r#"{"markets":[]}"#).unwrap(), None);
    assert_eq!(parse_event(r#"{"slug":"x"}"#).unwrap(), None);
    assert_eq!(parse_event(r#"{"markets":[{"question":"q"}]}"#).unwrap(), None);
  }

  #[test]
  fn test_parse_event_malformed() {
    assert!(matches!(parse_event("<html>"), Err(LookupError::Malformed(_))));
    assert!(matches!(
      parse_event(r#"{"markets":[{"clobTokenIds":"[\"only-one\"]"}]}"#),
      Err(LookupError::Malformed(_))
    ));
    assert!(matches!(
      parse_event(r#"{"markets":[{"clobTokenIds":"garbage"}]}"#),
      Err(LookupError::Malformed(_))
    ));
    assert!(matches!(
      parse_event(r#"{"markets":[{"clobTokenIds":["1","1"]}]}"#),
      Err(LookupError::Malformed(_))
    ));
  }

  #[test]
  fn test_config_from_prediction_section() {
    let prediction = PredictionConfig {
      gamma_url: "https://gamma.example/".to_string(),
      lookup_timeout_ms: 2_500,
      ..PredictionConfig::default()
    };
    let config = GammaClientConfig::from(&prediction);
    assert_eq!(config.base_url, "https://gamma.example");
    assert_eq!(config.timeout, Duration::from_millis(2_500));
  }
}
