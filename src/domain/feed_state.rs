//! Feed State - Single-Writer Per-Feed State and Its Published View
//!
//! `FeedState` is owned by exactly one supervisor. Readers never touch
//! it; they receive whole `FeedSnapshot` values, so a reader can never
//! observe half of a delta batch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::connection::{transition, ConnectionEvent, ConnectionStatus, TransitionError};
use super::events::FeedEvent;
use super::order_book::OrderBook;
use super::price_state::{Outcome, ScalarPriceState, TickOutcome};
use super::window::ActiveMarket;

/// Price storage matching what the feed exposes.
#[derive(Debug, Clone)]
enum PriceStore {
    /// Full depth book (exchange feed).
    Book(OrderBook),
    /// Outcome ticks only (prediction feed).
    Outcomes(ScalarPriceState),
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Published prices changed.
    Changed,
    /// Nothing observable changed.
    Unchanged,
    /// Event refused; the reason is logged by the caller.
    Rejected(String),
    /// The session must be torn down and re-established.
    Resubscribe(String),
}

/// Top-of-book or outcome prices as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceView {
    Book {
        best_bid: Option<Decimal>,
        best_ask: Option<Decimal>,
    },
    Outcomes {
        up: Option<Decimal>,
        down: Option<Decimal>,
    },
}

impl PriceView {
    /// At least one usable price.
    pub fn has_price(&self) -> bool {
        match self {
            Self::Book { best_bid, best_ask } => best_bid.is_some() || best_ask.is_some(),
            Self::Outcomes { up, down } => up.is_some() || down.is_some(),
        }
    }
}

/// Immutable view of one feed, published after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    pub feed: &'static str,
    pub status: ConnectionStatus,
    pub last_message_at: Option<DateTime<Utc>>,
    pub prices: PriceView,
    pub market: Option<ActiveMarket>,
    pub messages: u64,
    pub decode_errors: u64,
    pub reconnects: u32,
}

impl FeedSnapshot {
    /// Usable price and the feed is not stopped.
    pub fn has_price(&self) -> bool {
        self.status != ConnectionStatus::Stopped && self.prices.has_price()
    }

    /// Values are visible but no longer fresh.
    pub fn is_stale(&self) -> bool {
        self.status == ConnectionStatus::Degraded
    }
}

/// Mutable per-feed state.
#[derive(Debug, Clone)]
pub struct FeedState {
    feed: &'static str,
    status: ConnectionStatus,
    last_message_at: Option<DateTime<Utc>>,
    prices: PriceStore,
    market: Option<ActiveMarket>,
    messages: u64,
    decode_errors: u64,
    reconnects: u32,
}

impl FeedState {
    /// State for a feed exposing a full order book.
    pub fn with_book(feed: &'static str) -> Self {
        Self::new(feed, PriceStore::Book(OrderBook::new()))
    }

    /// State for a feed exposing outcome ticks.
    pub fn with_outcomes(feed: &'static str) -> Self {
        Self::new(feed, PriceStore::Outcomes(ScalarPriceState::new()))
    }

    fn new(feed: &'static str, prices: PriceStore) -> Self {
        Self {
            feed,
            status: ConnectionStatus::Disconnected,
            last_message_at: None,
            prices,
            market: None,
            messages: 0,
            decode_errors: 0,
            reconnects: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn market(&self) -> Option<&ActiveMarket> {
        self.market.as_ref()
    }

    /// Drive the lifecycle state machine.
    pub fn on(&mut self, event: ConnectionEvent) -> Result<ConnectionStatus, TransitionError> {
        self.status = transition(self.status, event)?;
        Ok(self.status)
    }

    /// Note an inbound frame of any kind.
    pub fn record_message(&mut self, at: DateTime<Utc>) {
        self.last_message_at = Some(at);
        self.messages += 1;
    }

    pub fn record_reconnect(&mut self) {
        self.reconnects = self.reconnects.saturating_add(1);
    }

    /// Discard prices; a fresh snapshot is required before they return.
    pub fn invalidate(&mut self) {
        match &mut self.prices {
            PriceStore::Book(book) => book.invalidate(),
            PriceStore::Outcomes(state) => state.clear(),
        }
    }

    /// Bind the market the next session subscribes to.
    ///
    /// A different market supersedes the old one and flushes every price
    /// keyed by its ids. Returns true when a supersede happened.
    pub fn bind_market(&mut self, market: ActiveMarket) -> bool {
        if self.market.as_ref() == Some(&market) {
            return false;
        }
        let superseded = self.market.is_some();
        self.invalidate();
        self.market = Some(market);
        superseded
    }

    /// Apply one decoded event in arrival order.
    pub fn apply(&mut self, event: FeedEvent) -> Applied {
        match (event, &mut self.prices) {
            (FeedEvent::Snapshot { bids, asks }, PriceStore::Book(book)) => {
                book.apply_snapshot(&bids, &asks);
                Applied::Changed
            }
            (FeedEvent::LevelUpdate { side, price, size }, PriceStore::Book(book)) => {
                let before = (book.best_bid(), book.best_ask());
                match book.apply_delta(side, price, size) {
                    Ok(()) if before == (book.best_bid(), book.best_ask()) => Applied::Unchanged,
                    Ok(()) => Applied::Changed,
                    Err(e) => Applied::Rejected(e.to_string()),
                }
            }
            (
                FeedEvent::PriceTick {
                    outcome,
                    price,
                    timestamp_ms,
                },
                PriceStore::Outcomes(state),
            ) => match state.apply(outcome, price, timestamp_ms) {
                TickOutcome::Updated => Applied::Changed,
                TickOutcome::Unchanged => Applied::Unchanged,
                TickOutcome::Stale => {
                    Applied::Rejected(format!("out-of-order {outcome} tick at {price}"))
                }
            },
            (
                FeedEvent::OutcomeCleared {
                    outcome,
                    timestamp_ms,
                },
                PriceStore::Outcomes(state),
            ) => match state.clear_outcome(outcome, timestamp_ms) {
                TickOutcome::Updated => Applied::Changed,
                TickOutcome::Unchanged => Applied::Unchanged,
                TickOutcome::Stale => Applied::Rejected(format!("out-of-order {outcome} clear")),
            },
            (FeedEvent::Heartbeat { .. } | FeedEvent::Unrecognized, _) => Applied::Unchanged,
            (FeedEvent::DecodeError(reason), _) => {
                self.decode_errors += 1;
                Applied::Rejected(reason)
            }
            (FeedEvent::SequenceGap { expected, received }, _) => Applied::Resubscribe(format!(
                "sequence gap: expected {expected}, received {received}"
            )),
            (FeedEvent::InstrumentRejected(reason), _) => {
                Applied::Resubscribe(format!("instrument rejected: {reason}"))
            }
            (other, _) => Applied::Rejected(format!("event not supported by this feed: {other:?}")),
        }
    }

    /// Current read-only view.
    pub fn snapshot(&self) -> FeedSnapshot {
        let prices = match &self.prices {
            PriceStore::Book(book) => PriceView::Book {
                best_bid: book.best_bid(),
                best_ask: book.best_ask(),
            },
            PriceStore::Outcomes(state) => PriceView::Outcomes {
                up: state.price(Outcome::Up),
                down: state.price(Outcome::Down),
            },
        };

        FeedSnapshot {
            feed: self.feed,
            status: self.status,
            last_message_at: self.last_message_at,
            prices,
            market: self.market.clone(),
            messages: self.messages,
            decode_errors: self.decode_errors,
            reconnects: self.reconnects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_book::{PriceLevel, Side};
    use rust_decimal_macros::dec;

    fn market(start: i64, up: &str, down: &str) -> ActiveMarket {
        ActiveMarket {
            up_token_id: up.into(),
            down_token_id: down.into(),
            label: "BTC Up or Down".into(),
            slug: format!("btc-updown-15m-{start}"),
            window_start: start,
            window_end: start + 900,
        }
    }

    fn snapshot_event() -> FeedEvent {
        FeedEvent::Snapshot {
            bids: vec![PriceLevel::new(dec!(100), dec!(1))],
            asks: vec![PriceLevel::new(dec!(101), dec!(1))],
        }
    }

    #[test]
    fn test_book_feed_applies_snapshot_and_delta() {
        let mut state = FeedState::with_book("coinbase");
        assert_eq!(state.apply(snapshot_event()), Applied::Changed);
        assert_eq!(
            state.apply(FeedEvent::LevelUpdate {
                side: Side::Bid,
                price: dec!(50),
                size: dec!(1),
            }),
            Applied::Unchanged
        );
        assert_eq!(
            state.apply(FeedEvent::LevelUpdate {
                side: Side::Bid,
                price: dec!(100.5),
                size: dec!(1),
            }),
            Applied::Changed
        );
        assert_eq!(
            state.snapshot().prices,
            PriceView::Book {
                best_bid: Some(dec!(100.5)),
                best_ask: Some(dec!(101)),
            }
        );
    }

    #[test]
    fn test_reconnect_invalidation_hides_prices_until_snapshot() {
        let mut state = FeedState::with_book("coinbase");
        state.apply(snapshot_event());
        state.invalidate();

        assert!(!state.snapshot().prices.has_price());
        let applied = state.apply(FeedEvent::LevelUpdate {
            side: Side::Ask,
            price: dec!(101),
            size: dec!(2),
        });
        assert!(matches!(applied, Applied::Rejected(_)));
        assert!(!state.snapshot().prices.has_price());

        state.apply(snapshot_event());
        assert!(state.snapshot().prices.has_price());
    }

    #[test]
    fn test_rollover_flushes_outcome_prices() {
        let mut state = FeedState::with_outcomes("polymarket");
        assert!(!state.bind_market(market(900, "a", "b")));
        state.apply(FeedEvent::PriceTick {
            outcome: Outcome::Up,
            price: dec!(51),
            timestamp_ms: Some(1),
        });
        assert!(state.snapshot().prices.has_price());

        assert!(!state.bind_market(market(900, "a", "b")));
        assert!(state.snapshot().prices.has_price());

        assert!(state.bind_market(market(1800, "c", "d")));
        assert!(!state.snapshot().prices.has_price());
        assert_eq!(state.market().map(|m| m.window_start), Some(1800));
    }

    #[test]
    fn test_emptied_book_withdraws_outcome_price() {
        let mut state = FeedState::with_outcomes("polymarket");
        state.bind_market(market(900, "a", "b"));
        for (outcome, price) in [(Outcome::Up, dec!(51)), (Outcome::Down, dec!(49))] {
            state.apply(FeedEvent::PriceTick {
                outcome,
                price,
                timestamp_ms: Some(5),
            });
        }

        assert_eq!(
            state.apply(FeedEvent::OutcomeCleared {
                outcome: Outcome::Down,
                timestamp_ms: Some(6),
            }),
            Applied::Changed
        );
        assert_eq!(
            state.snapshot().prices,
            PriceView::Outcomes {
                up: Some(dec!(51)),
                down: None,
            }
        );
    }

    #[test]
    fn test_control_events() {
        let mut state = FeedState::with_book("coinbase");
        assert_eq!(
            state.apply(FeedEvent::Heartbeat { counter: Some(3) }),
            Applied::Unchanged
        );
        assert!(matches!(
            state.apply(FeedEvent::SequenceGap {
                expected: 4,
                received: 6
            }),
            Applied::Resubscribe(_)
        ));
        assert!(matches!(
            state.apply(FeedEvent::DecodeError("bad json".into())),
            Applied::Rejected(_)
        ));
        assert_eq!(state.snapshot().decode_errors, 1);
    }

    #[test]
    fn test_stopped_feed_reports_no_price() {
        let mut state = FeedState::with_book("coinbase");
        state.apply(snapshot_event());
        state.on(ConnectionEvent::Shutdown).unwrap();
        let snap = state.snapshot();
        assert!(snap.prices.has_price());
        assert!(!snap.has_price());
    }
}
