//! Text Output - Operator Lines on Stdout
//!
//! Renders each comparison as a three-line block:
//!
//! ```text
//! COINBASE BTC PRICE   = $67,123.45 (bid 67,123.40 | ask 67,123.50)
//! POLYMARKET BTC PRICE = 50.50¢ (UP: 51.00¢ | DOWN: 50.00¢ | spread 1.00¢)
//! Updated: 12:34:56.789
//! ```

use std::io::Write;

use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::comparison::{Comparison, ExchangeQuote, OutcomeQuote};
use crate::ports::output::ComparisonSink;

/// Writes rendered comparisons to any `Write`.
pub struct TextSink<W: Write + Send + 'static> {
    writer: W,
    /// Base asset shown in the labels, e.g. "BTC".
    asset: String,
}

impl TextSink<std::io::Stdout> {
    /// Sink writing to stdout.
    pub fn stdout(asset: impl Into<String>) -> Self {
        Self::new(std::io::stdout(), asset)
    }
}

impl<W: Write + Send + 'static> TextSink<W> {
    pub fn new(writer: W, asset: impl Into<String>) -> Self {
        Self {
            writer,
            asset: asset.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + 'static> ComparisonSink for TextSink<W> {
    fn emit(&mut self, comparison: &Comparison) {
        let block = render(comparison, &self.asset);
        if let Err(e) = writeln!(self.writer, "{block}\n").and_then(|()| self.writer.flush()) {
            warn!(error = %e, "Failed to write comparison");
        }
    }
}

/// Render one comparison block (no trailing newline).
pub fn render(comparison: &Comparison, asset: &str) -> String {
    let exchange_label = format!("COINBASE {asset} PRICE");
    let prediction_label = format!("POLYMARKET {asset} PRICE");
    let width = exchange_label.len().max(prediction_label.len());

    let exchange = comparison
        .exchange
        .as_ref()
        .map_or_else(|| "n/a (feed stopped)".to_string(), render_exchange);
    let prediction = comparison
        .prediction
        .as_ref()
        .map_or_else(|| "n/a (feed stopped)".to_string(), render_prediction);

    format!(
        "{exchange_label:<width$} = {exchange}\n{prediction_label:<width$} = {prediction}\nUpdated: {}",
        comparison.at.format("%H:%M:%S%.3f"),
    )
}

fn render_exchange(quote: &ExchangeQuote) -> String {
    let price = quote
        .reference_price()
        .map_or_else(|| "-".to_string(), |p| format!("${}", thousands(p)));
    let bid = quote.best_bid.map_or_else(|| "-".to_string(), thousands);
    let ask = quote.best_ask.map_or_else(|| "-".to_string(), thousands);
    format!("{price} (bid {bid} | ask {ask}){}", stale_tag(quote.stale))
}

fn render_prediction(quote: &OutcomeQuote) -> String {
    let price = quote
        .mid
        .or(quote.up)
        .or(quote.down)
        .map_or_else(|| "-".to_string(), cents);
    let up = quote.up.map_or_else(|| "-".to_string(), cents);
    let down = quote.down.map_or_else(|| "-".to_string(), cents);
    let spread = quote
        .spread
        .map(|s| format!(" | spread {}", cents(s)))
        .unwrap_or_default();
    format!("{price} (UP: {up} | DOWN: {down}{spread}){}", stale_tag(quote.stale))
}

fn stale_tag(stale: bool) -> &'static str {
    if stale { " [stale]" } else { "" }
}

fn cents(value: Decimal) -> String {
    format!("{:.2}¢", value.round_dp(2))
}

/// Two decimals with `,` thousands separators.
fn thousands(value: Decimal) -> String {
    let fixed = format!("{:.2}", value.round_dp(2));
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn comparison() -> Comparison {
        Comparison {
            at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
                + chrono::Duration::milliseconds(789),
            exchange: Some(ExchangeQuote {
                best_bid: Some(dec!(67123.40)),
                best_ask: Some(dec!(67123.50)),
                mid: Some(dec!(67123.45)),
                spread: Some(dec!(0.10)),
                stale: false,
            }),
            prediction: Some(OutcomeQuote {
                up: Some(dec!(51)),
                down: Some(dec!(50)),
                mid: Some(dec!(50.5)),
                spread: Some(dec!(1)),
                stale: false,
            }),
            market_label: Some("Bitcoin Up or Down".to_string()),
        }
    }

    #[test]
    fn test_render_block() {
        assert_eq!(
            render(&comparison(), "BTC"),
            "COINBASE BTC PRICE   = $67,123.45 (bid 67,123.40 | ask 67,123.50)\n\
             POLYMARKET BTC PRICE = 50.50¢ (UP: 51.00¢ | DOWN: 50.00¢ | spread 1.00¢)\n\
             Updated: 12:34:56.789"
        );
    }

    #[test]
    fn test_render_partial_and_stale() {
        let mut c = comparison();
        c.exchange = None;
        c.prediction = Some(OutcomeQuote {
            up: Some(dec!(51)),
            down: None,
            mid: None,
            spread: None,
            stale: true,
        });
        let text = render(&c, "BTC");
        assert!(text.contains("COINBASE BTC PRICE   = n/a (feed stopped)"));
        assert!(text.contains("= 51.00¢ (UP: 51.00¢ | DOWN: -) [stale]"));
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(dec!(0)), "0.00");
        assert_eq!(thousands(dec!(999.999)), "1,000.00");
        assert_eq!(thousands(dec!(1234567.891)), "1,234,567.89");
        assert_eq!(thousands(dec!(-1234.5)), "-1,234.50");
    }

    #[test]
    fn test_sink_writes_block() {
        let mut sink = TextSink::new(Vec::new(), "BTC");
        sink.emit(&comparison());
        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert!(written.starts_with("COINBASE BTC PRICE"));
        assert!(written.ends_with("Updated: 12:34:56.789\n\n"));
    }
}
