//! Market Lookup Port - Slug to Instrument Resolution
//!
//! One-shot REST lookup of the market published for a window slug.
//! Absence is a normal answer near window boundaries, not an error.

use async_trait::async_trait;
use thiserror::Error;

/// Market as described by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDescriptor {
  /// Outcome token ids: `[up, down]`.
  pub token_ids: [String; 2],
  /// Human-readable market question.
  pub label: String,
}

/// Lookup failures that are not "not found".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  /// Request failed or returned an unexpected status.
  #[error("lookup request failed: {0}")]
  Http(String),

  /// A response arrived but could not be interpreted.
  #[error("malformed lookup response: {0}")]
  Malformed(String),
}

/// Trait for instrument lookup providers.
#[async_trait]
pub trait MarketLookup: Send + Sync + 'static {
  /// Find the market published under `slug`.
  ///
  /// `Ok(None)` means not (yet) published.
  async fn lookup(&self, slug: &str) -> Result<Option<MarketDescriptor>, LookupError>;
}
