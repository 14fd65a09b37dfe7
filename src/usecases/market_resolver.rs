//! Market Resolver - Active Instrument of the Rotating Feed
//!
//! Derives the current window from the wall clock, builds its slug and
//! asks the lookup service for the market published under it.
//!
//! Outcomes:
//! - Published market: `ActiveMarket` for the window
//! - Not yet published or lookup unreachable: `ResolutionUnavailable`
//!   (the supervisor retries with backoff)
//! - Repeated malformed responses: `Configuration` (the feed stops)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::error::FeedError;
use crate::domain::window::{ActiveMarket, MarketWindow};
use crate::ports::market_lookup::{LookupError, MarketLookup};

/// Resolves the market bound to the current window.
pub struct MarketResolver {
  /// Window schedule and slug convention.
  window: MarketWindow,
  /// Slug lookup service.
  lookup: Arc<dyn MarketLookup>,
  /// Malformed responses tolerated in a row.
  max_malformed: u32,
  /// Current run of malformed responses.
  malformed_streak: u32,
}

impl MarketResolver {
  /// Create a resolver over `lookup`.
  pub fn new(window: MarketWindow, lookup: Arc<dyn MarketLookup>, max_malformed: u32) -> Self {
    Self {
      window,
      lookup,
      max_malformed: max_malformed.max(1),
      malformed_streak: 0,
    }
  }

  /// Start of the window containing `now`.
  pub fn current_window_start(&self, now: DateTime<Utc>) -> i64 {
    self.window.current_window_start(now.timestamp())
  }

  /// Resolve the market of the window starting at `window_start`.
  pub async fn resolve_active_market(&mut self, window_start: i64) -> Result<ActiveMarket, FeedError> {
    let slug = self.window.slug(window_start);

    match self.lookup.lookup(&slug).await {
      Ok(Some(descriptor)) => {
        self.malformed_streak = 0;
        let [up_token_id, down_token_id] = descriptor.token_ids;
        let market = ActiveMarket {
          up_token_id,
          down_token_id,
          label: descriptor.label,
          slug,
          window_start,
          window_end: self.window.window_end(window_start),
        };
        info!(
          slug = %market.slug,
          label = %market.label,
          window_end = market.window_end,
          "Resolved active market"
        );
        Ok(market)
      }
      Ok(None) => {
        self.malformed_streak = 0;
        debug!(slug = %slug, "Market not published yet");
        Err(FeedError::ResolutionUnavailable { slug })
      }
      Err(LookupError::Http(reason)) => {
        warn!(slug = %slug, reason = %reason, "Market lookup failed");
        Err(FeedError::ResolutionUnavailable { slug })
      }
      Err(LookupError::Malformed(reason)) => {
        self.malformed_streak += 1;
        warn!(
          slug = %slug,
          reason = %reason,
          streak = self.malformed_streak,
          limit = self.max_malformed,
          "Malformed market lookup response"
        );
        if self.malformed_streak >= self.max_malformed {
          Err(FeedError::Configuration(format!(
            "{} consecutive malformed lookups for {slug}: {reason}",
            self.malformed_streak
          )))
        } else {
          Err(FeedError::ResolutionUnavailable { slug })
        }
      }
    }
  }

  /// Resolve the market of the window containing the current wall clock.
  pub async fn resolve_now(&mut self) -> Result<ActiveMarket, FeedError> {
    let window_start = self.current_window_start(Utc::now());
    self.resolve_active_market(window_start).await
  }
}
