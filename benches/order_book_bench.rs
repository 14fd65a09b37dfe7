//! Order Book Benchmarks - Hot-Path Performance Validation
//!
//! Benchmarks the work done on every inbound frame: decoding, applying
//! book deltas and deriving the cross-feed comparison.
//!
//! Run with: cargo bench --bench order_book_bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use updown_feed_sync::adapters::feeds::CoinbaseProtocol;
use updown_feed_sync::config::ExchangeConfig;
use updown_feed_sync::domain::comparison::Comparison;
use updown_feed_sync::domain::events::FeedEvent;
use updown_feed_sync::domain::feed_state::FeedState;
use updown_feed_sync::domain::order_book::{OrderBook, PriceLevel, Side};
use updown_feed_sync::domain::price_state::Outcome;
use updown_feed_sync::ports::market_feed::FeedProtocol;

/// 500 levels per side around 67,000.
fn deep_levels() -> (Vec<PriceLevel>, Vec<PriceLevel>) {
    let bids = (0..500)
        .map(|i| PriceLevel::new(Decimal::new(6_700_000 - i, 2), Decimal::new(15, 1)))
        .collect();
    let asks = (1..=500)
        .map(|i| PriceLevel::new(Decimal::new(6_700_000 + i, 2), Decimal::new(15, 1)))
        .collect();
    (bids, asks)
}

/// Benchmark a full 1,000-level snapshot load.
fn bench_snapshot(c: &mut Criterion) {
    let (bids, asks) = deep_levels();
    let mut book = OrderBook::new();

    c.bench_function("book_snapshot_1000_levels", |b| {
        b.iter(|| book.apply_snapshot(black_box(&bids), black_box(&asks)));
    });
}

/// Benchmark one upsert plus one removal on a deep book.
fn bench_delta(c: &mut Criterion) {
    let (bids, asks) = deep_levels();
    let mut book = OrderBook::new();
    book.apply_snapshot(&bids, &asks);
    let price = Decimal::new(6_699_950, 2);

    c.bench_function("book_delta_upsert_remove", |b| {
        b.iter(|| {
            let _ = book.apply_delta(Side::Bid, black_box(price), black_box(Decimal::ONE));
            let _ = book.apply_delta(Side::Bid, black_box(price), Decimal::ZERO);
            black_box(book.best_bid())
        });
    });
}

/// Benchmark decoding a ten-level l2_data update frame.
fn bench_decode_update(c: &mut Criterion) {
    let updates: Vec<String> = (0..10)
        .map(|i| {
            format!(
                r#"{{"side":"bid","event_time":"2024-05-01T12:00:00Z","price_level":"67000.{i:02}","new_quantity":"0.5"}}"#
            )
        })
        .collect();
    let frame = format!(
        r#"{{"channel":"l2_data","timestamp":"2024-05-01T12:00:00Z","events":[{{"type":"update","product_id":"BTC-USD","updates":[{}]}}]}}"#,
        updates.join(",")
    );
    let mut protocol = CoinbaseProtocol::new(ExchangeConfig::default());

    c.bench_function("coinbase_decode_l2_update", |b| {
        b.iter(|| protocol.decode(black_box(&frame)));
    });
}

/// Benchmark deriving one comparison from both snapshots.
fn bench_comparison(c: &mut Criterion) {
    let (bids, asks) = deep_levels();
    let mut exchange = FeedState::with_book("coinbase");
    exchange.apply(FeedEvent::Snapshot { bids, asks });
    let mut prediction = FeedState::with_outcomes("polymarket");
    for (outcome, cents) in [(Outcome::Up, 5_150), (Outcome::Down, 4_850)] {
        prediction.apply(FeedEvent::PriceTick {
            outcome,
            price: Decimal::new(cents, 2),
            timestamp_ms: None,
        });
    }
    let exchange = exchange.snapshot();
    let prediction = prediction.snapshot();

    c.bench_function("comparison_derive", |b| {
        b.iter(|| Comparison::derive(black_box(&exchange), black_box(&prediction), Utc::now()));
    });
}

criterion_group!(
    benches,
    bench_snapshot,
    bench_delta,
    bench_decode_update,
    bench_comparison,
);
criterion_main!(benches);
