//! Scalar Price State - Last Known Outcome Prices
//!
//! Used for feeds that only publish top-of-book style ticks. Holds one
//! price per outcome side of the bound market.
//!
//! Ordering: when a tick carries a timestamp, a tick stamped strictly
//! older than the stored one is rejected. Equal stamps are accepted in
//! arrival order because several changes of one message share a stamp.
//! Ticks without a stamp are last-write-wins; the feed gives no way to
//! detect reordering for them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Complementary outcome of an up/down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Up,
    Down,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamped {
    price: Decimal,
    timestamp_ms: Option<u64>,
}

/// Result of offering a tick to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stored value changed.
    Updated,
    /// Same price re-delivered; nothing to publish.
    Unchanged,
    /// Stamped older than the stored value.
    Stale,
}

/// Last known price per outcome.
#[derive(Debug, Clone, Default)]
pub struct ScalarPriceState {
    up: Option<Stamped>,
    down: Option<Stamped>,
}

impl ScalarPriceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a tick for one outcome.
    pub fn apply(
        &mut self,
        outcome: Outcome,
        price: Decimal,
        timestamp_ms: Option<u64>,
    ) -> TickOutcome {
        let slot = match outcome {
            Outcome::Up => &mut self.up,
            Outcome::Down => &mut self.down,
        };

        if let Some(current) = slot.as_mut() {
            if let (Some(new_ts), Some(old_ts)) = (timestamp_ms, current.timestamp_ms) {
                if new_ts < old_ts {
                    return TickOutcome::Stale;
                }
            }
            if current.price == price {
                current.timestamp_ms = timestamp_ms.or(current.timestamp_ms);
                return TickOutcome::Unchanged;
            }
        }

        // Keep the newest known stamp so a later stamp-less tick
        // cannot reopen the window for older stamped ones.
        let previous_ts = slot.and_then(|s| s.timestamp_ms);
        *slot = Some(Stamped {
            price,
            timestamp_ms: timestamp_ms.or(previous_ts),
        });
        TickOutcome::Updated
    }

    /// Withdraw one outcome's price; an older stamp is refused.
    pub fn clear_outcome(&mut self, outcome: Outcome, timestamp_ms: Option<u64>) -> TickOutcome {
        let slot = match outcome {
            Outcome::Up => &mut self.up,
            Outcome::Down => &mut self.down,
        };
        match slot.take() {
            Some(current) => {
                if let (Some(new_ts), Some(old_ts)) = (timestamp_ms, current.timestamp_ms) {
                    if new_ts < old_ts {
                        *slot = Some(current);
                        return TickOutcome::Stale;
                    }
                }
                TickOutcome::Updated
            }
            None => TickOutcome::Unchanged,
        }
    }

    /// Last price for one outcome.
    pub fn price(&self, outcome: Outcome) -> Option<Decimal> {
        match outcome {
            Outcome::Up => self.up.map(|s| s.price),
            Outcome::Down => self.down.map(|s| s.price),
        }
    }

    /// Whether any outcome has a price.
    pub fn has_price(&self) -> bool {
        self.up.is_some() || self.down.is_some()
    }

    /// Forget both outcomes (rollover or reconnect).
    pub fn clear(&mut self) {
        self.up = None;
        self.down = None;
    }
}
