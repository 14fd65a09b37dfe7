//! Order Book Store - Snapshot + Delta Level Book
//!
//! Holds price -> size levels for one instrument. A book starts
//! uninitialized and reports no prices until a full snapshot has been
//! applied; deltas are applied strictly in call order.
//!
//! Prices and sizes are `Decimal` so that high-precision levels never
//! collide through float rounding.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// One aggregated price level. `size == 0` means "remove this level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Errors raised by the order book.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    /// A delta arrived before any snapshot was loaded.
    #[error("delta for {side} {price} applied before snapshot")]
    NotInitialized { side: Side, price: Decimal },
}

/// Two-sided aggregated order book.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    initialized: bool,
}

impl OrderBook {
    /// Create an empty, uninitialized book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every level atomically and mark the book trusted.
    ///
    /// Levels with a non-positive size are dropped.
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids = collect_side(bids);
        self.asks = collect_side(asks);
        self.initialized = true;
    }

    /// Upsert or remove a single level.
    ///
    /// A non-positive size removes the level whether or not it existed.
    pub fn apply_delta(
        &mut self,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<(), BookError> {
        if !self.initialized {
            return Err(BookError::NotInitialized { side, price });
        }

        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };

        if size <= Decimal::ZERO {
            levels.remove(&price);
        } else {
            levels.insert(price, size);
        }
        Ok(())
    }

    /// Drop all levels; a fresh snapshot is required before prices return.
    pub fn invalidate(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.initialized = false;
    }

    /// Whether a snapshot has been applied since creation or invalidation.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Highest bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Size resting at an exact price, if any.
    pub fn size_at(&self, side: Side, price: Decimal) -> Option<Decimal> {
        match side {
            Side::Bid => self.bids.get(&price).copied(),
            Side::Ask => self.asks.get(&price).copied(),
        }
    }

    /// Number of levels on one side.
    pub fn depth(&self, side: Side) -> usize {
        match side {
            Side::Bid => self.bids.len(),
            Side::Ask => self.asks.len(),
        }
    }

    /// Midpoint between best bid and best ask.
    pub fn mid(&self) -> Option<Decimal> {
        Some((self.best_bid()? + self.best_ask()?) / Decimal::TWO)
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// True when the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b >= a)
    }
}

fn collect_side(levels: &[PriceLevel]) -> BTreeMap<Decimal, Decimal> {
    levels
        .iter()
        .filter(|l| l.size > Decimal::ZERO)
        .map(|l| (l.price, l.size))
        .collect()
}
