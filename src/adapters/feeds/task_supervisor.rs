//! Feed Task Supervisor - Lifecycle Management for Feed Connections
//!
//! Runs one feed protocol over a WebSocket with automatic reconnect.
//! Uses tokio::select! for event-driven monitoring (never polling):
//! frames, keep-alive failures, staleness, market rollover and the
//! shutdown signal all wake the same loop.
//!
//! The supervisor is the single writer of its `FeedState` and publishes
//! a `FeedSnapshot` through a watch channel after every visible change.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::config::ConnectionConfig;
use crate::domain::connection::{Backoff, ConnectionEvent, ConnectionStatus};
use crate::domain::error::FeedError;
use crate::domain::events::FeedEvent;
use crate::domain::feed_state::{Applied, FeedSnapshot, FeedState};
use crate::ports::market_feed::{FeedProtocol, KeepAlive, Subscription};

/// Timeouts and backoff bounds for one supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub connect_timeout: Duration,
    pub stale_timeout: Duration,
    pub hard_stale_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub resolution_retry_base: Duration,
    pub resolution_retry_max: Duration,
}

impl From<&ConnectionConfig> for SupervisorConfig {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            stale_timeout: config.stale_timeout(),
            hard_stale_timeout: config.hard_stale_timeout(),
            reconnect_base: Duration::from_millis(config.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
            resolution_retry_base: Duration::from_millis(config.resolution_retry_base_ms),
            resolution_retry_max: Duration::from_millis(config.resolution_retry_max_ms),
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    /// The bound market's window closed.
    Rollover { expires_at: DateTime<Utc> },
    /// The feed demanded a fresh subscription.
    Resubscribe(String),
    /// Transport failure or hard staleness.
    Lost(FeedError),
}

impl SessionEnd {
    fn reason(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Rollover { .. } => "rollover",
            Self::Resubscribe(_) => "resubscribe",
            Self::Lost(e) => e.kind(),
        }
    }
}

/// Supervises one feed connection.
///
/// Reconnects with bounded exponential backoff, re-running
/// `FeedProtocol::prepare` before every attempt. Only a configuration
/// error stops it before shutdown.
pub struct ConnectionSupervisor<P: FeedProtocol> {
    /// Wire protocol of the supervised feed.
    protocol: P,
    /// Timeouts and backoff bounds.
    config: SupervisorConfig,
    /// Single-writer feed state.
    state: FeedState,
    /// Publishes snapshots to readers.
    snapshot_tx: watch::Sender<FeedSnapshot>,
    /// Optional Prometheus registry.
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<P: FeedProtocol> ConnectionSupervisor<P> {
    /// Create a supervisor for `protocol`.
    pub fn new(protocol: P, config: SupervisorConfig) -> Self {
        let state = protocol.initial_state();
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        Self {
            protocol,
            config,
            state,
            snapshot_tx,
            metrics: None,
        }
    }

    /// Record feed metrics into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Receiver of the feed's published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run until shutdown or a configuration error.
    #[instrument(skip_all, fields(feed = self.protocol.name()))]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), FeedError> {
        let feed = self.protocol.name();
        let mut backoff = Backoff::new(self.config.reconnect_base, self.config.reconnect_max);
        let mut resolution_backoff = Backoff::new(
            self.config.resolution_retry_base,
            self.config.resolution_retry_max,
        );

        info!(url = self.protocol.url(), "Feed supervisor started");

        loop {
            self.fire(ConnectionEvent::Connect);
            self.publish();

            let prepared = tokio::select! {
                _ = shutdown_rx.recv() => None,
                prepared = self.protocol.prepare() => Some(prepared),
            };
            let subscription = match prepared {
                None => return self.stop(),
                Some(Ok(subscription)) => subscription,
                Some(Err(e)) if e.is_fatal() => {
                    error!(error = %e, "Feed stopped on configuration error");
                    self.record_resolution_failure(&e);
                    self.fire(ConnectionEvent::FatalError);
                    self.publish();
                    return Err(e);
                }
                Some(Err(e)) => {
                    self.record_resolution_failure(&e);
                    self.fire(ConnectionEvent::ConnectionLost);
                    self.publish();
                    let delay = resolution_backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = resolution_backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Instrument preparation failed, retrying"
                    );
                    if !pause(delay, &mut shutdown_rx).await {
                        return self.stop();
                    }
                    continue;
                }
            };
            resolution_backoff.reset();

            if let Some(market) = subscription.market.clone() {
                let label = market.label.clone();
                let slug = market.slug.clone();
                if self.state.bind_market(market) {
                    if let Some(metrics) = &self.metrics {
                        metrics.rollovers.inc();
                    }
                    info!(slug = %slug, label = %label, "Rolled over to next market");
                }
            }

            let (end, received) = self.session(&subscription, &mut shutdown_rx).await;
            self.protocol.on_disconnect();

            if matches!(end, SessionEnd::Shutdown) {
                return self.stop();
            }

            self.state.invalidate();
            self.fire(ConnectionEvent::ConnectionLost);
            self.state.record_reconnect();
            if let Some(metrics) = &self.metrics {
                metrics.reconnects.with_label_values(&[feed, end.reason()]).inc();
            }
            self.publish();

            if received {
                backoff.reset();
            }

            let delay = match &end {
                SessionEnd::Rollover { expires_at } => {
                    info!(expired_at = %expires_at, "Market window closed, re-resolving");
                    until(*expires_at)
                }
                SessionEnd::Resubscribe(reason) => {
                    warn!(reason = %reason, "Resubscribing for a fresh snapshot");
                    backoff.next_delay()
                }
                SessionEnd::Lost(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Feed disconnected, reconnecting"
                    );
                    delay
                }
                SessionEnd::Shutdown => Duration::ZERO,
            };

            if !delay.is_zero() && !pause(delay, &mut shutdown_rx).await {
                return self.stop();
            }
        }
    }

    /// One connection: connect, subscribe, then pump frames until the
    /// session ends. Returns whether any frame was received.
    async fn session(
        &mut self,
        subscription: &Subscription,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> (SessionEnd, bool) {
        let url = self.protocol.url().to_string();
        let connect = timeout(self.config.connect_timeout, connect_async(url.as_str()));

        let ws_stream = tokio::select! {
            _ = shutdown_rx.recv() => return (SessionEnd::Shutdown, false),
            result = connect => match result {
                Ok(Ok((ws_stream, _))) => ws_stream,
                Ok(Err(e)) => {
                    return (SessionEnd::Lost(FeedError::Transport(format!("connect failed: {e}"))), false);
                }
                Err(_) => {
                    return (SessionEnd::Lost(FeedError::Transport("connect timed out".to_string())), false);
                }
            },
        };

        let (mut write, read) = ws_stream.split();

        for message in &subscription.messages {
            if let Err(e) = write.send(Message::Text(message.clone())).await {
                return (SessionEnd::Lost(FeedError::Transport(format!("subscribe failed: {e}"))), false);
            }
        }

        self.fire(ConnectionEvent::Subscribed);
        self.publish();
        info!(
            frames = subscription.messages.len(),
            market = subscription.market.as_ref().map(|m| m.slug.as_str()),
            "Feed subscribed"
        );

        let (sent_tx, sent_rx) = mpsc::channel(8);
        let (keep_alive_task, _idle_sink) = match self.protocol.keep_alive() {
            Some(schedule) => (Some(spawn_keep_alive(write, schedule, sent_tx)), None),
            None => (None, Some(write)),
        };

        self.pump(read, keep_alive_task, sent_rx, subscription.expires_at, shutdown_rx)
            .await
    }

    /// Frame loop of one subscribed session.
    async fn pump<S>(
        &mut self,
        mut read: S,
        mut keep_alive_task: Option<JoinHandle<String>>,
        mut sent_rx: mpsc::Receiver<()>,
        expires_at: Option<DateTime<Utc>>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> (SessionEnd, bool)
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let rollover_at = expires_at.map(|at| Instant::now() + until(at));
        let mut last_frame = Instant::now();
        let mut received = false;

        let end = loop {
            let silence_limit = if self.state.status() == ConnectionStatus::Degraded {
                self.config.hard_stale_timeout
            } else {
                self.config.stale_timeout
            };
            let stale_at = last_frame + silence_limit;

            tokio::select! {
                _ = shutdown_rx.recv() => break SessionEnd::Shutdown,

                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_frame = Instant::now();
                        received = true;
                        if let Some(end) = self.on_frame(&text) {
                            break end;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        last_frame = Instant::now();
                        received = true;
                        if let Some(end) = self.on_frame(&String::from_utf8_lossy(&bytes)) {
                            break end;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_frame = Instant::now();
                        if self.on_liveness() {
                            self.publish();
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server: {} {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        break SessionEnd::Lost(FeedError::Transport(reason));
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => break SessionEnd::Lost(FeedError::Transport(e.to_string())),
                    None => break SessionEnd::Lost(FeedError::Transport("stream ended".to_string())),
                },

                Some(()) = sent_rx.recv() => {
                    self.fire(ConnectionEvent::KeepAliveSent);
                    debug!("Keep-alive sent");
                }

                reason = join_keep_alive(&mut keep_alive_task) => {
                    break SessionEnd::Lost(FeedError::Transport(format!("keep-alive failed: {reason}")));
                }

                _ = sleep_until(stale_at) => {
                    let silent_ms = last_frame.elapsed().as_millis() as u64;
                    if self.state.status() == ConnectionStatus::Degraded {
                        break SessionEnd::Lost(FeedError::StaleFeed { silent_ms });
                    }
                    warn!(silent_ms, "Feed silent, marking degraded");
                    self.fire(ConnectionEvent::StaleTimeout);
                    self.publish();
                }

                _ = sleep_until(rollover_at.unwrap_or(stale_at)), if rollover_at.is_some() => {
                    if let Some(expires_at) = expires_at {
                        break SessionEnd::Rollover { expires_at };
                    }
                }
            }
        };

        if let Some(task) = keep_alive_task {
            task.abort();
        }
        (end, received)
    }

    /// Decode and apply one frame in arrival order. Publishes when
    /// prices or status changed.
    fn on_frame(&mut self, text: &str) -> Option<SessionEnd> {
        let feed = self.protocol.name();
        self.state.record_message(Utc::now());
        let mut changed = self.on_liveness();
        if let Some(metrics) = &self.metrics {
            metrics.messages.with_label_values(&[feed]).inc();
        }

        for event in self.protocol.decode(text) {
            if let FeedEvent::DecodeError(reason) = &event {
                let error = FeedError::Decode(reason.clone());
                debug!(error = %error, kind = error.kind(), "Frame skipped");
                if let Some(metrics) = &self.metrics {
                    metrics.decode_errors.with_label_values(&[feed]).inc();
                }
            }

            match self.state.apply(event) {
                Applied::Changed => changed = true,
                Applied::Unchanged => {}
                Applied::Rejected(reason) => debug!(reason = %reason, "Event rejected"),
                Applied::Resubscribe(reason) => {
                    self.publish();
                    return Some(SessionEnd::Resubscribe(reason));
                }
            }
        }

        if changed {
            self.publish();
        }
        None
    }

    /// Any inbound traffic. Returns true when a degraded feed recovered.
    fn on_liveness(&mut self) -> bool {
        let was_degraded = self.state.status() == ConnectionStatus::Degraded;
        self.fire(ConnectionEvent::MessageReceived);
        if was_degraded {
            info!("Feed recovered");
        }
        was_degraded
    }

    /// Drive the state machine; invalid events are logged and ignored.
    fn fire(&mut self, event: ConnectionEvent) {
        if let Err(e) = self.state.on(event) {
            debug!(error = %e, "Ignored connection event");
        }
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        if let Some(metrics) = &self.metrics {
            metrics.observe_snapshot(&snapshot);
        }
        self.snapshot_tx.send_replace(snapshot);
    }

    fn record_resolution_failure(&self, error: &FeedError) {
        if let Some(metrics) = &self.metrics {
            metrics.resolution_failures.with_label_values(&[error.kind()]).inc();
        }
    }

    /// Terminal transition on shutdown.
    fn stop(&mut self) -> Result<(), FeedError> {
        self.fire(ConnectionEvent::Shutdown);
        self.publish();
        info!("Feed supervisor stopped");
        Ok(())
    }
}

/// Sleep unless shutdown arrives first. Returns false on shutdown.
async fn pause(delay: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => false,
        _ = sleep(delay) => true,
    }
}

/// Time left until `at`, zero when already past.
fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Write `schedule.payload` every interval after the settle delay.
///
/// Owns the write half for the session; returns the error text when a
/// send fails. Each successful send is reported on `sent_tx`.
fn spawn_keep_alive<W>(mut write: W, schedule: KeepAlive, sent_tx: mpsc::Sender<()>) -> JoinHandle<String>
where
    W: futures_util::Sink<Message, Error = WsError> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + schedule.settle, schedule.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = write.send(Message::Text(schedule.payload.clone())).await {
                return e.to_string();
            }
            let _ = sent_tx.try_send(());
        }
    })
}

/// Resolve when the keep-alive task ends; pending forever without one.
async fn join_keep_alive(task: &mut Option<JoinHandle<String>>) -> String {
    match task.as_mut() {
        Some(handle) => match handle.await {
            Ok(reason) => reason,
            Err(e) => format!("task ended: {e}"),
        },
        None => std::future::pending().await,
    }
}
