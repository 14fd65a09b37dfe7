//! Canonical Feed Events
//!
//! Every wire protocol is decoded into this small vocabulary. Prices are
//! already in display units, so nothing downstream branches on feed
//! identity.

use rust_decimal::Decimal;

use super::order_book::{PriceLevel, Side};
use super::price_state::Outcome;

/// One decoded unit of feed activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Full replacement of both book sides.
    Snapshot {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    },
    /// Upsert/remove one level (size 0 removes).
    LevelUpdate {
        side: Side,
        price: Decimal,
        size: Decimal,
    },
    /// Top-of-book price for one outcome of the bound market.
    PriceTick {
        outcome: Outcome,
        price: Decimal,
        timestamp_ms: Option<u64>,
    },
    /// The outcome's book has no bids left; its price is withdrawn.
    OutcomeCleared {
        outcome: Outcome,
        timestamp_ms: Option<u64>,
    },
    /// Liveness only; `counter` when the feed numbers its heartbeats.
    Heartbeat { counter: Option<u64> },
    /// Sequence numbers skipped; the book can no longer be trusted.
    SequenceGap { expected: u64, received: u64 },
    /// The feed refused the subscribed instrument.
    InstrumentRejected(String),
    /// Well-formed but not relevant to this engine.
    Unrecognized,
    /// Malformed frame; logged, counted and skipped.
    DecodeError(String),
}
