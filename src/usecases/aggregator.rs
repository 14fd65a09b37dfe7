//! Aggregator - Rate-Limited Cross-Feed Output
//!
//! Watches both feeds' published snapshots and emits a `Comparison`
//! through the configured sink when:
//! - every running feed has at least one usable price, and
//! - at least `min_interval` has passed since the previous emission.
//!
//! An update suppressed by the interval is not lost: a trailing
//! emission fires when the interval ends, with the latest values.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::comparison::Comparison;
use crate::domain::feed_state::FeedSnapshot;
use crate::ports::output::ComparisonSink;

/// Minimum-interval gate with a trailing edge.
#[derive(Debug, Clone)]
pub struct OutputGate {
  /// Minimum time between two emissions.
  min_interval: Duration,
  /// When the last emission happened.
  last_emit: Option<Instant>,
  /// An update arrived inside the interval.
  pending: bool,
}

impl OutputGate {
  pub fn new(min_interval: Duration) -> Self {
    Self {
      min_interval,
      last_emit: None,
      pending: false,
    }
  }

  /// Offer an emission at `now`. Returns true when it may go out now;
  /// otherwise it is remembered for the trailing edge.
  pub fn offer(&mut self, now: Instant) -> bool {
    match self.last_emit {
      Some(last) if now.saturating_duration_since(last) < self.min_interval => {
        self.pending = true;
        false
      }
      _ => {
        self.last_emit = Some(now);
        self.pending = false;
        true
      }
    }
  }

  /// When the trailing emission is due, if one is pending.
  pub fn trailing_deadline(&self) -> Option<Instant> {
    if !self.pending {
      return None;
    }
    self.last_emit.map(|last| last + self.min_interval)
  }

  /// Consume the pending trailing emission if it is due at `now`.
  pub fn take_trailing(&mut self, now: Instant) -> bool {
    match self.trailing_deadline() {
      Some(deadline) if now >= deadline => self.offer(now),
      _ => false,
    }
  }

  /// Forget a pending trailing emission.
  pub fn clear_pending(&mut self) {
    self.pending = false;
  }
}

/// What woke the aggregator loop.
enum Wake {
  Shutdown,
  Exchange(bool),
  Prediction(bool),
  Trailing,
}

/// Merges both feeds and drives the output gate.
pub struct Aggregator<S: ComparisonSink> {
  exchange_rx: watch::Receiver<FeedSnapshot>,
  prediction_rx: watch::Receiver<FeedSnapshot>,
  gate: OutputGate,
  sink: S,
  metrics: Option<Arc<MetricsRegistry>>,
  emitted: u64,
}

impl<S: ComparisonSink> Aggregator<S> {
  /// Create an aggregator over both feeds' snapshot channels.
  pub fn new(
    exchange_rx: watch::Receiver<FeedSnapshot>,
    prediction_rx: watch::Receiver<FeedSnapshot>,
    min_interval: Duration,
    sink: S,
  ) -> Self {
    Self {
      exchange_rx,
      prediction_rx,
      gate: OutputGate::new(min_interval),
      sink,
      metrics: None,
      emitted: 0,
    }
  }

  /// Count emissions in `metrics`.
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Comparisons emitted so far.
  pub fn emitted(&self) -> u64 {
    self.emitted
  }

  /// Latest comparison of both feeds, if one can be formed.
  fn current(&self) -> Option<Comparison> {
    let exchange = self.exchange_rx.borrow();
    let prediction = self.prediction_rx.borrow();
    Comparison::derive(&exchange, &prediction, Utc::now())
  }

  /// A feed published a new snapshot at `now`. Emits and returns the
  /// comparison when the gate allows it.
  pub fn on_update(&mut self, now: Instant) -> Option<Comparison> {
    let comparison = self.current()?;
    if !self.gate.offer(now) {
      return None;
    }
    self.emit(&comparison);
    Some(comparison)
  }

  /// The trailing deadline passed. Emits the latest values if an update
  /// was suppressed.
  pub fn on_trailing(&mut self, now: Instant) -> Option<Comparison> {
    let Some(comparison) = self.current() else {
      self.gate.clear_pending();
      return None;
    };
    if !self.gate.take_trailing(now) {
      return None;
    }
    self.emit(&comparison);
    Some(comparison)
  }

  /// When the next trailing emission is due.
  pub fn next_deadline(&self) -> Option<Instant> {
    self.gate.trailing_deadline()
  }

  fn emit(&mut self, comparison: &Comparison) {
    self.sink.emit(comparison);
    self.emitted += 1;
    if let Some(metrics) = &self.metrics {
      metrics.emissions.inc();
    }
  }

  /// Run until shutdown or until both feeds are gone.
  #[instrument(skip_all)]
  pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let mut exchange_open = true;
    let mut prediction_open = true;

    info!("Aggregator started");

    while exchange_open || prediction_open {
      let deadline = self.next_deadline();

      let wake = tokio::select! {
        _ = shutdown_rx.recv() => Wake::Shutdown,
        changed = self.exchange_rx.changed(), if exchange_open => Wake::Exchange(changed.is_ok()),
        changed = self.prediction_rx.changed(), if prediction_open => Wake::Prediction(changed.is_ok()),
        _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Trailing,
      };

      match wake {
        Wake::Shutdown => break,
        Wake::Exchange(false) => {
          debug!("Exchange feed channel closed");
          exchange_open = false;
        }
        Wake::Prediction(false) => {
          debug!("Prediction feed channel closed");
          prediction_open = false;
        }
        Wake::Exchange(true) | Wake::Prediction(true) => {
          self.on_update(Instant::now());
        }
        Wake::Trailing => {
          self.on_trailing(Instant::now());
        }
      }
    }

    info!(emitted = self.emitted, "Aggregator stopped");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::connection::ConnectionEvent;
  use crate::domain::events::FeedEvent;
  use crate::domain::feed_state::FeedState;
  use crate::domain::order_book::PriceLevel;
  use crate::domain::price_state::Outcome;
  use rust_decimal_macros::dec;
  use std::sync::Mutex;

  #[derive(Clone, Default)]
  struct Collect(Arc<Mutex<Vec<Comparison>>>);

  impl ComparisonSink for Collect {
    fn emit(&mut self, comparison: &Comparison) {
      self.0.lock().unwrap().push(comparison.clone());
    }
  }

  impl Collect {
    fn len(&self) -> usize {
      self.0.lock().unwrap().len()
    }
  }

  fn exchange_with_price(bid: rust_decimal::Decimal) -> FeedSnapshot {
    let mut state = FeedState::with_book("coinbase");
    state.apply(FeedEvent::Snapshot {
      bids: vec![PriceLevel::new(bid, dec!(1))],
      asks: vec![PriceLevel::new(bid + dec!(1), dec!(1))],
    });
    state.snapshot()
  }

  fn prediction_with_price() -> FeedSnapshot {
    let mut state = FeedState::with_outcomes("polymarket");
    state.apply(FeedEvent::PriceTick {
      outcome: Outcome::Up,
      price: dec!(51),
      timestamp_ms: None,
    });
    state.snapshot()
  }

  fn empty(feed: &'static str) -> FeedSnapshot {
    FeedState::with_book(feed).snapshot()
  }

  #[test]
  fn test_gate_interval_and_trailing_edge() {
    let start = Instant::now();
    let mut gate = OutputGate::new(Duration::from_millis(1000));

    assert!(gate.offer(start));
    assert!(!gate.offer(start + Duration::from_millis(10)));
    assert_eq!(gate.trailing_deadline(), Some(start + Duration::from_millis(1000)));
    assert!(!gate.take_trailing(start + Duration::from_millis(999)));
    assert!(gate.take_trailing(start + Duration::from_millis(1000)));
    assert_eq!(gate.trailing_deadline(), None);
    assert!(!gate.offer(start + Duration::from_millis(1500)));
    assert!(gate.offer(start + Duration::from_millis(2000)));
  }

  #[test]
  fn test_no_emission_before_both_feeds_have_prices() {
    let (ex_tx, ex_rx) = watch::channel(empty("coinbase"));
    let (pm_tx, pm_rx) = watch::channel(empty("polymarket"));
    let sink = Collect::default();
    let mut agg = Aggregator::new(ex_rx, pm_rx, Duration::from_millis(1000), sink.clone());
    let t0 = Instant::now();

    ex_tx.send_replace(exchange_with_price(dec!(100)));
    assert!(agg.on_update(t0).is_none());
    assert_eq!(agg.next_deadline(), None);

    pm_tx.send_replace(prediction_with_price());
    let emitted = agg.on_update(t0 + Duration::from_millis(1)).unwrap();
    assert_eq!(emitted.exchange.unwrap().mid, Some(dec!(100.5)));
    assert_eq!(emitted.prediction.unwrap().up, Some(dec!(51)));
    assert_eq!(sink.len(), 1);
  }

  #[test]
  fn test_burst_of_updates_emits_once_per_interval() {
    let (ex_tx, ex_rx) = watch::channel(exchange_with_price(dec!(100)));
    let (_pm_tx, pm_rx) = watch::channel(prediction_with_price());
    let sink = Collect::default();
    let mut agg = Aggregator::new(ex_rx, pm_rx, Duration::from_millis(1000), sink.clone());
    let t0 = Instant::now();

    for i in 0..100u32 {
      ex_tx.send_replace(exchange_with_price(dec!(100) + rust_decimal::Decimal::from(i)));
      agg.on_update(t0 + Duration::from_millis(u64::from(i)));
    }
    assert_eq!(sink.len(), 1);

    let deadline = agg.next_deadline().unwrap();
    assert_eq!(deadline, t0 + Duration::from_millis(1000));
    let trailing = agg.on_trailing(deadline).unwrap();
    assert_eq!(trailing.exchange.unwrap().best_bid, Some(dec!(199)));
    assert_eq!(sink.len(), 2);
    assert_eq!(agg.emitted(), 2);
  }

  #[test]
  fn test_stopped_feed_is_silenced() {
    let mut stopped = FeedState::with_outcomes("polymarket");
    stopped.on(ConnectionEvent::Shutdown).unwrap();
    let (_ex_tx, ex_rx) = watch::channel(exchange_with_price(dec!(100)));
    let (_pm_tx, pm_rx) = watch::channel(stopped.snapshot());
    let mut agg = Aggregator::new(ex_rx, pm_rx, Duration::from_millis(1000), Collect::default());

    let emitted = agg.on_update(Instant::now()).unwrap();
    assert!(emitted.exchange.is_some());
    assert!(emitted.prediction.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_run_emits_trailing_and_stops_on_shutdown() {
    let (ex_tx, ex_rx) = watch::channel(exchange_with_price(dec!(100)));
    let (_pm_tx, pm_rx) = watch::channel(prediction_with_price());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sink = Collect::default();
    let agg = Aggregator::new(ex_rx, pm_rx, Duration::from_millis(1000), sink.clone());
    let handle = tokio::spawn(agg.run(shutdown_rx));

    ex_tx.send_replace(exchange_with_price(dec!(101)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    ex_tx.send_replace(exchange_with_price(dec!(102)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sink.len(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(sink.len(), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
  }
}
