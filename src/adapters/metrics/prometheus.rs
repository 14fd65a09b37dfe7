//! Prometheus Metrics Registry - Feed Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers connection
//! status, message and decode-error counts, reconnects, market
//! rollovers, resolution failures, emitted comparisons and the latest
//! published prices.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::feed_state::{FeedSnapshot, PriceView};

/// Centralized Prometheus metrics for the feed engine.
///
/// All metrics follow the naming convention `updown_feed_*` and carry
/// a `feed` label where they are per feed.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Connection status code per feed (see `ConnectionStatus::code`).
    pub feed_status: IntGaugeVec,
    /// Inbound frames per feed.
    pub messages: IntCounterVec,
    /// Frames that failed to decode per feed.
    pub decode_errors: IntCounterVec,
    /// Session restarts per feed and reason.
    pub reconnects: IntCounterVec,
    /// Active market supersedes.
    pub rollovers: IntCounter,
    /// Failed market resolutions by error kind.
    pub resolution_failures: IntCounterVec,
    /// Comparisons that passed the output gate.
    pub emissions: IntCounter,
    /// Latest published price per feed and side.
    pub latest_price: GaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let feed_status = IntGaugeVec::new(
            Opts::new(
                "updown_feed_status",
                "Connection status (0=disconnected, 1=connecting, 2=subscribed, 3=degraded, 4=stopped)",
            ),
            &["feed"],
        )?;

        let messages = IntCounterVec::new(
            Opts::new("updown_feed_messages_total", "Inbound frames received"),
            &["feed"],
        )?;

        let decode_errors = IntCounterVec::new(
            Opts::new(
                "updown_feed_decode_errors_total",
                "Frames that could not be decoded",
            ),
            &["feed"],
        )?;

        let reconnects = IntCounterVec::new(
            Opts::new("updown_feed_reconnects_total", "Sessions torn down and re-established"),
            &["feed", "reason"],
        )?;

        let rollovers = IntCounter::new(
            "updown_feed_rollovers_total",
            "Active market superseded by the next window",
        )?;

        let resolution_failures = IntCounterVec::new(
            Opts::new(
                "updown_feed_resolution_failures_total",
                "Failed active market resolutions",
            ),
            &["kind"],
        )?;

        let emissions = IntCounter::new(
            "updown_feed_emissions_total",
            "Comparisons emitted through the output gate",
        )?;

        let latest_price = GaugeVec::new(
            Opts::new("updown_feed_latest_price", "Latest published price"),
            &["feed", "side"],
        )?;

        // Register all metrics
        registry.register(Box::new(feed_status.clone()))?;
        registry.register(Box::new(messages.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(rollovers.clone()))?;
        registry.register(Box::new(resolution_failures.clone()))?;
        registry.register(Box::new(emissions.clone()))?;
        registry.register(Box::new(latest_price.clone()))?;

        Ok(Self {
            registry,
            feed_status,
            messages,
            decode_errors,
            reconnects,
            rollovers,
            resolution_failures,
            emissions,
            latest_price,
        })
    }

    /// Mirror one published snapshot into the status and price gauges.
    pub fn observe_snapshot(&self, snapshot: &FeedSnapshot) {
        self.feed_status
            .with_label_values(&[snapshot.feed])
            .set(snapshot.status.code());

        let sides = match snapshot.prices {
            PriceView::Book { best_bid, best_ask } => [("bid", best_bid), ("ask", best_ask)],
            PriceView::Outcomes { up, down } => [("up", up), ("down", down)],
        };
        for (side, price) in sides {
            let gauge = self.latest_price.with_label_values(&[snapshot.feed, side]);
            gauge.set(price.as_ref().and_then(Decimal::to_f64).unwrap_or(f64::NAN));
        }
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
