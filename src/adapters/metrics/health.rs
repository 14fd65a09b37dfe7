//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks. Readiness requires every feed to be subscribed.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument};

use crate::domain::connection::ConnectionStatus;
use crate::domain::feed_state::FeedSnapshot;

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Latest snapshot of each supervised feed.
    feeds: Vec<watch::Receiver<FeedSnapshot>>,
}

impl HealthState {
    /// Create a health state over the given feeds.
    pub fn new(feeds: Vec<watch::Receiver<FeedSnapshot>>) -> Self {
        Self { feeds }
    }

    /// Ready when every feed is subscribed and fresh.
    pub fn is_ready(&self) -> bool {
        !self.feeds.is_empty()
            && self
                .feeds
                .iter()
                .all(|rx| rx.borrow().status == ConnectionStatus::Subscribed)
    }

    /// One `feed=status` line per feed, for the probe body.
    pub fn summary(&self) -> String {
        self.feeds
            .iter()
            .map(|rx| {
                let snap = rx.borrow();
                format!("{}={}", snap.feed, snap.status)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve the probes until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only if all feeds are subscribed.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        let body = state.summary();
        if state.is_ready() {
            (StatusCode::OK, format!("READY\n{body}"))
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, format!("NOT READY\n{body}"))
        }
    }
}
