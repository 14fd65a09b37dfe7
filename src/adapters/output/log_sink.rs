//! Log Output - Comparisons as Structured Tracing Events

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::comparison::Comparison;
use crate::ports::output::ComparisonSink;

/// Emits each comparison as one `info!` event on target `comparison`.
#[derive(Debug, Default)]
pub struct LogSink;

fn num(value: Option<Decimal>) -> Option<f64> {
    value.as_ref().and_then(Decimal::to_f64)
}

impl ComparisonSink for LogSink {
    fn emit(&mut self, comparison: &Comparison) {
        let exchange = comparison.exchange.as_ref();
        let prediction = comparison.prediction.as_ref();

        info!(
            target: "comparison",
            at = %comparison.at.to_rfc3339(),
            market = comparison.market_label.as_deref().unwrap_or(""),
            exchange_bid = num(exchange.and_then(|q| q.best_bid)),
            exchange_ask = num(exchange.and_then(|q| q.best_ask)),
            exchange_mid = num(exchange.and_then(|q| q.mid)),
            exchange_spread = num(exchange.and_then(|q| q.spread)),
            exchange_stale = exchange.is_some_and(|q| q.stale),
            up_cents = num(prediction.and_then(|q| q.up)),
            down_cents = num(prediction.and_then(|q| q.down)),
            prediction_mid = num(prediction.and_then(|q| q.mid)),
            prediction_spread = num(prediction.and_then(|q| q.spread)),
            prediction_stale = prediction.is_some_and(|q| q.stale),
            "Feed comparison"
        );
    }
}
