//! Market Feed Port - Wire Protocol Interface
//!
//! Defines what the connection supervisor needs from a feed: where to
//! connect, how to subscribe, how to keep the session alive, and how to
//! decode frames into canonical events. The supervisor owns sockets,
//! timers and reconnection; implementors own only the protocol.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::error::FeedError;
use crate::domain::events::FeedEvent;
use crate::domain::feed_state::FeedState;
use crate::domain::window::ActiveMarket;

/// Everything needed to open one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
  /// Text frames sent right after the socket opens.
  pub messages: Vec<String>,
  /// Instrument bound for this session (rotating feeds only).
  pub market: Option<ActiveMarket>,
  /// The session is closed and re-prepared at this instant (rollover).
  pub expires_at: Option<DateTime<Utc>>,
}

/// Application-level keep-alive schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
  /// Text frame to send, e.g. `PING`.
  pub payload: String,
  /// Delay after subscribing before the first send.
  pub settle: Duration,
  /// Fixed interval between sends.
  pub interval: Duration,
}

/// A feed wire protocol.
///
/// `prepare` runs before every connection attempt, which is where a
/// rotating feed re-confirms its active instrument.
#[async_trait]
pub trait FeedProtocol: Send + 'static {
  /// Short feed name for logs and metrics.
  fn name(&self) -> &'static str;

  /// WebSocket endpoint.
  fn url(&self) -> &str;

  /// Empty state matching what this feed exposes.
  fn initial_state(&self) -> FeedState;

  /// Resolve instruments and build the subscription frames.
  ///
  /// `ResolutionUnavailable` is retried with backoff; `Configuration`
  /// stops the feed.
  async fn prepare(&mut self) -> Result<Subscription, FeedError>;

  /// Decode one text frame. Must not fail: malformed input becomes
  /// `FeedEvent::DecodeError`.
  fn decode(&mut self, text: &str) -> Vec<FeedEvent>;

  /// Keep-alive schedule, if the server requires one.
  fn keep_alive(&self) -> Option<KeepAlive> {
    None
  }

  /// Called when a session ends for any reason.
  fn on_disconnect(&mut self) {}
}
