//! Up/Down Feed Sync - Entry Point
//!
//! Wires both feed supervisors, the aggregator and the monitoring
//! servers. Runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml (path from the first argument) + validate
//! 2. Init tracing (JSON or pretty, on stderr)
//! 3. Create Prometheus registry (optional)
//! 4. Create Coinbase supervisor (level2 order book)
//! 5. Create Gamma client + market resolver + Polymarket supervisor
//! 6. Spawn both supervisors (auto-reconnect WebSockets)
//! 7. Spawn aggregator with the configured sink
//! 8. Spawn metrics (:9090) and health (:8080) servers
//! 9. Wait for SIGINT/SIGTERM → broadcast shutdown → join tasks

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use updown_feed_sync::adapters::api::{GammaClient, GammaClientConfig};
use updown_feed_sync::adapters::feeds::{
    CoinbaseProtocol, ConnectionSupervisor, PolymarketProtocol, SupervisorConfig,
};
use updown_feed_sync::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use updown_feed_sync::adapters::output::{LogSink, TextSink};
use updown_feed_sync::config::{self, AppSection, LogFormat, OutputFormat};
use updown_feed_sync::domain::window::MarketWindow;
use updown_feed_sync::ports::market_feed::FeedProtocol;
use updown_feed_sync::ports::output::ComparisonSink;
use updown_feed_sync::usecases::aggregator::Aggregator;
use updown_feed_sync::usecases::market_resolver::MarketResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured logging ────────────────────
    init_tracing(&config.app)?;

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        product = %config.exchange.product_id,
        slug_prefix = %config.prediction.slug_prefix,
        window_seconds = config.prediction.window_seconds,
        min_interval_ms = config.output.min_interval_ms,
        output = ?config.output.format,
        "Configuration loaded, starting up/down feed sync"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(4);

    // ── 3. Metrics registry ─────────────────────────────────
    let metrics = if config.metrics.enabled {
        Some(Arc::new(
            MetricsRegistry::new().context("Failed to create metrics registry")?,
        ))
    } else {
        None
    };

    // ── 4. Exchange feed supervisor ─────────────────────────
    let supervisor_config = SupervisorConfig::from(&config.connection);
    let exchange = ConnectionSupervisor::new(
        CoinbaseProtocol::new(config.exchange.clone()),
        supervisor_config.clone(),
    );

    // ── 5. Prediction feed supervisor ───────────────────────
    let gamma = Arc::new(
        GammaClient::new(GammaClientConfig::from(&config.prediction))
            .context("Failed to create Gamma client")?,
    );
    let resolver = MarketResolver::new(
        MarketWindow::new(
            config.prediction.window_seconds,
            config.prediction.slug_prefix.clone(),
        ),
        gamma,
        config.prediction.max_malformed_lookups,
    );
    let prediction = ConnectionSupervisor::new(
        PolymarketProtocol::new(config.prediction.clone(), resolver),
        supervisor_config,
    );

    let (exchange, prediction) = match &metrics {
        Some(m) => (
            exchange.with_metrics(Arc::clone(m)),
            prediction.with_metrics(Arc::clone(m)),
        ),
        None => (exchange, prediction),
    };
    let exchange_rx = exchange.subscribe();
    let prediction_rx = prediction.subscribe();

    // ── 6. Spawn feed supervisors ───────────────────────────
    let mut handles = vec![
        spawn_supervisor(exchange, shutdown_tx.subscribe()),
        spawn_supervisor(prediction, shutdown_tx.subscribe()),
    ];

    // ── 7. Spawn aggregator ─────────────────────────────────
    let min_interval = Duration::from_millis(config.output.min_interval_ms);
    let asset = config
        .exchange
        .product_id
        .split('-')
        .next()
        .unwrap_or("BTC")
        .to_string();
    let aggregator_handle = match config.output.format {
        OutputFormat::Text => spawn_aggregator(
            Aggregator::new(
                exchange_rx.clone(),
                prediction_rx.clone(),
                min_interval,
                TextSink::stdout(asset),
            ),
            metrics.clone(),
            shutdown_tx.subscribe(),
        ),
        OutputFormat::Log => spawn_aggregator(
            Aggregator::new(
                exchange_rx.clone(),
                prediction_rx.clone(),
                min_interval,
                LogSink,
            ),
            metrics.clone(),
            shutdown_tx.subscribe(),
        ),
    };
    handles.push(aggregator_handle);

    // ── 8. Monitoring servers ───────────────────────────────
    let mut server_handles = Vec::new();
    if let Some(m) = &metrics {
        let registry = Arc::clone(m);
        let bind_address = config.metrics.bind_address.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = registry.serve(bind_address, shutdown_rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }));

        let health = HealthServer::new(
            Arc::new(HealthState::new(vec![exchange_rx, prediction_rx])),
            config.metrics.health_port,
        );
        let shutdown_rx = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = health.run(shutdown_rx).await {
                error!(error = %e, "Health server failed");
            }
        }));
    }

    info!("All tasks spawned - feeds are syncing");

    // ── 9. Wait for SIGINT or SIGTERM ───────────────────────
    shutdown_signal().await;

    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Task did not stop within 5s");
        }
    }
    for handle in server_handles {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber on stderr.
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(app: &AppSection) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&app.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match app.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

/// Spawn one supervisor; a configuration error stops only that feed.
fn spawn_supervisor<P: FeedProtocol>(
    supervisor: ConnectionSupervisor<P>,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = supervisor.run(shutdown_rx).await {
            error!(error = %e, kind = e.kind(), "Feed supervisor exited");
        }
    })
}

fn spawn_aggregator<S: ComparisonSink>(
    aggregator: Aggregator<S>,
    metrics: Option<Arc<MetricsRegistry>>,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let aggregator = match metrics {
        Some(m) => aggregator.with_metrics(m),
        None => aggregator,
    };
    tokio::spawn(async move {
        if let Err(e) = aggregator.run(shutdown_rx).await {
            error!(error = %e, "Aggregator failed");
        }
    })
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, initiating graceful shutdown"),
        _ = terminate => info!("SIGTERM received, initiating graceful shutdown"),
    }
}
