//! Cross-Feed Comparison - Derived Metrics
//!
//! Combines the latest exchange and prediction-market snapshots into one
//! record: exchange top of book, mid and spread; outcome prices, their
//! mid and the spread between the complementary sides.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::feed_state::{FeedSnapshot, PriceView};

/// Exchange side of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExchangeQuote {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    /// Mid when both sides exist.
    pub mid: Option<Decimal>,
    /// Ask minus bid when both sides exist.
    pub spread: Option<Decimal>,
    pub stale: bool,
}

impl ExchangeQuote {
    /// Mid, or whichever side is present.
    pub fn reference_price(&self) -> Option<Decimal> {
        self.mid.or(self.best_bid).or(self.best_ask)
    }
}

/// Prediction-market side of the comparison, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeQuote {
    pub up: Option<Decimal>,
    pub down: Option<Decimal>,
    /// Average of both outcomes when both exist.
    pub mid: Option<Decimal>,
    /// |up - down| when both exist.
    pub spread: Option<Decimal>,
    pub stale: bool,
}

/// One emitted comparison record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub at: DateTime<Utc>,
    pub exchange: Option<ExchangeQuote>,
    pub prediction: Option<OutcomeQuote>,
    /// Label of the bound prediction market.
    pub market_label: Option<String>,
}

impl Comparison {
    /// Build a comparison from both feeds' latest snapshots.
    ///
    /// Returns `None` unless every feed that is still running has a price
    /// and at least one feed contributes. A stopped feed is silenced.
    pub fn derive(
        exchange: &FeedSnapshot,
        prediction: &FeedSnapshot,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        let exchange_quote = exchange_quote(exchange);
        let outcome_quote = outcome_quote(prediction);

        let exchange_ready = exchange_quote.is_some() || exchange.status.is_stopped();
        let prediction_ready = outcome_quote.is_some() || prediction.status.is_stopped();
        if !exchange_ready || !prediction_ready {
            return None;
        }
        if exchange_quote.is_none() && outcome_quote.is_none() {
            return None;
        }

        Some(Self {
            at,
            exchange: exchange_quote,
            prediction: outcome_quote,
            market_label: prediction.market.as_ref().map(|m| m.label.clone()),
        })
    }
}

fn exchange_quote(snapshot: &FeedSnapshot) -> Option<ExchangeQuote> {
    if !snapshot.has_price() {
        return None;
    }
    let PriceView::Book { best_bid, best_ask } = snapshot.prices else {
        return None;
    };
    let both = best_bid.zip(best_ask);
    Some(ExchangeQuote {
        best_bid,
        best_ask,
        mid: both.and_then(|(b, a)| midpoint(b, a)),
        spread: both.and_then(|(b, a)| a.checked_sub(b)),
        stale: snapshot.is_stale(),
    })
}

fn outcome_quote(snapshot: &FeedSnapshot) -> Option<OutcomeQuote> {
    if !snapshot.has_price() {
        return None;
    }
    let PriceView::Outcomes { up, down } = snapshot.prices else {
        return None;
    };
    let both = up.zip(down);
    Some(OutcomeQuote {
        up,
        down,
        mid: both.and_then(|(u, d)| midpoint(u, d)),
        spread: both.and_then(|(u, d)| u.checked_sub(d)).map(|s| s.abs()),
        stale: snapshot.is_stale(),
    })
}

/// None when the sum leaves the decimal range.
fn midpoint(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_add(b).map(|sum| sum / Decimal::TWO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionStatus;
    use rust_decimal_macros::dec;

    fn snap(status: ConnectionStatus, prices: PriceView) -> FeedSnapshot {
        FeedSnapshot {
            feed: "test",
            status,
            last_message_at: None,
            prices,
            market: None,
            messages: 0,
            decode_errors: 0,
            reconnects: 0,
        }
    }

    fn book(bid: Option<Decimal>, ask: Option<Decimal>) -> PriceView {
        PriceView::Book {
            best_bid: bid,
            best_ask: ask,
        }
    }

    fn outcomes(up: Option<Decimal>, down: Option<Decimal>) -> PriceView {
        PriceView::Outcomes { up, down }
    }

    #[test]
    fn test_full_comparison() {
        let ex = snap(
            ConnectionStatus::Subscribed,
            book(Some(dec!(67000)), Some(dec!(67001))),
        );
        let pm = snap(
            ConnectionStatus::Degraded,
            outcomes(Some(dec!(53)), Some(dec!(47))),
        );
        let c = Comparison::derive(&ex, &pm, Utc::now()).unwrap();

        let e = c.exchange.unwrap();
        assert_eq!(e.mid, Some(dec!(67000.5)));
        assert_eq!(e.spread, Some(dec!(1)));
        assert!(!e.stale);

        let p = c.prediction.unwrap();
        assert_eq!(p.mid, Some(dec!(50)));
        assert_eq!(p.spread, Some(dec!(6)));
        assert!(p.stale);
    }

    #[test]
    fn test_requires_both_running_feeds() {
        let ex = snap(ConnectionStatus::Subscribed, book(Some(dec!(1)), None));
        let pm = snap(ConnectionStatus::Subscribed, outcomes(None, None));
        assert!(Comparison::derive(&ex, &pm, Utc::now()).is_none());
        assert!(Comparison::derive(&ex_empty(), &pm_with_up(), Utc::now()).is_none());
    }

    #[test]
    fn test_single_side_is_a_valid_price() {
        let ex = snap(ConnectionStatus::Subscribed, book(None, Some(dec!(10))));
        let pm = snap(ConnectionStatus::Subscribed, outcomes(Some(dec!(40)), None));
        let c = Comparison::derive(&ex, &pm, Utc::now()).unwrap();
        assert_eq!(c.exchange.unwrap().reference_price(), Some(dec!(10)));
        assert_eq!(c.prediction.unwrap().mid, None);
        assert_eq!(c.prediction.unwrap().spread, None);
    }

    #[test]
    fn test_stopped_feed_is_silenced() {
        let ex = snap(ConnectionStatus::Subscribed, book(Some(dec!(5)), Some(dec!(6))));
        let pm = snap(ConnectionStatus::Stopped, outcomes(Some(dec!(40)), None));
        let c = Comparison::derive(&ex, &pm, Utc::now()).unwrap();
        assert!(c.exchange.is_some());
        assert!(c.prediction.is_none());

        let dead = snap(ConnectionStatus::Stopped, book(None, None));
        let dead_pm = snap(ConnectionStatus::Stopped, outcomes(None, None));
        assert!(Comparison::derive(&dead, &dead_pm, Utc::now()).is_none());
    }

    #[test]
    fn test_out_of_range_levels_drop_mid() {
        let bid = Decimal::from_str_exact("79228162514264337593543950000").unwrap();
        let ask = Decimal::MAX;
        let ex = snap(ConnectionStatus::Subscribed, book(Some(bid), Some(ask)));
        let pm = snap(
            ConnectionStatus::Subscribed,
            outcomes(Some(Decimal::MAX), Some(Decimal::MAX)),
        );
        let c = Comparison::derive(&ex, &pm, Utc::now()).unwrap();

        let e = c.exchange.unwrap();
        assert_eq!(e.mid, None);
        assert_eq!(e.spread, Some(dec!(335)));
        assert_eq!(e.reference_price(), Some(bid));

        let p = c.prediction.unwrap();
        assert_eq!(p.mid, None);
        assert_eq!(p.spread, Some(Decimal::ZERO));
    }

    fn pm_with_up() -> FeedSnapshot {
        snap(ConnectionStatus::Subscribed, outcomes(Some(dec!(1)), None))
    }

    fn ex_empty() -> FeedSnapshot {
        snap(ConnectionStatus::Connecting, book(None, None))
    }
}
