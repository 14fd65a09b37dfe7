//! Polymarket WebSocket Feed - Rotating Up/Down Market Protocol
//!
//! Subscribes to the CLOB `market` channel for the two outcome tokens
//! of the active window. Before every connection the active market is
//! re-resolved, and the session expires at the window end so the
//! supervisor rolls over to the next market.
//!
//! Prices in [0, 1] are rescaled to cents here.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::parse_decimal;
use crate::config::PredictionConfig;
use crate::domain::error::FeedError;
use crate::domain::events::FeedEvent;
use crate::domain::feed_state::FeedState;
use crate::domain::price_state::Outcome;
use crate::domain::window::ActiveMarket;
use crate::ports::market_feed::{FeedProtocol, KeepAlive, Subscription};
use crate::usecases::market_resolver::MarketResolver;

/// Feed name used in logs, metrics and snapshots.
pub const FEED_NAME: &str = "polymarket";

/// Probability to cents.
const PRICE_SCALE: Decimal = dec!(100);

/// Market channel subscribe message.
#[derive(Serialize)]
struct SubscribeMsg<'a> {
    assets_ids: [&'a str; 2],
    #[serde(rename = "type")]
    msg_type: &'static str,
}

/// Any message on the market channel. Shapes are told apart by
/// `event_type`, or by the fields present when it is missing.
#[derive(Debug, Deserialize)]
struct MarketMessage {
    event_type: Option<String>,
    asset_id: Option<String>,
    bids: Option<Vec<BookLevel>>,
    price_changes: Option<Vec<PriceChange>>,
    /// Legacy shape: changes of the message-level `asset_id`.
    changes: Option<Vec<PriceChange>>,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BookLevel {
    price: Value,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    asset_id: Option<String>,
    price: Option<Value>,
    best_bid: Option<Value>,
}

/// Polymarket CLOB market channel protocol.
pub struct PolymarketProtocol {
    config: PredictionConfig,
    resolver: MarketResolver,
    /// Market bound to the current session.
    market: Option<ActiveMarket>,
}

impl PolymarketProtocol {
    pub fn new(config: PredictionConfig, resolver: MarketResolver) -> Self {
        Self {
            config,
            resolver,
            market: None,
        }
    }

    /// Market bound to the current session, if resolved.
    pub fn market(&self) -> Option<&ActiveMarket> {
        self.market.as_ref()
    }

    fn outcome_of(&self, asset_id: &str) -> Option<Outcome> {
        let market = self.market.as_ref()?;
        if asset_id == market.up_token_id {
            Some(Outcome::Up)
        } else if asset_id == market.down_token_id {
            Some(Outcome::Down)
        } else {
            None
        }
    }

    fn decode_message(&self, msg: MarketMessage) -> Vec<FeedEvent> {
        let timestamp_ms = msg.timestamp.as_ref().and_then(value_u64);

        let is_book = match msg.event_type.as_deref() {
            Some("book") => true,
            Some("price_change") => false,
            Some(other) => {
                debug!(event_type = other, "Ignoring market channel event");
                return vec![FeedEvent::Unrecognized];
            }
            None if msg.bids.is_some() => true,
            None if msg.price_changes.is_some() || msg.changes.is_some() => false,
            None => return vec![FeedEvent::Unrecognized],
        };

        if is_book {
            vec![self.decode_book(&msg, timestamp_ms)]
        } else {
            self.decode_changes(msg, timestamp_ms)
        }
    }

    /// Best bid of a book message: the highest bid, wherever it sits in
    /// the array.
    fn decode_book(&self, msg: &MarketMessage, timestamp_ms: Option<u64>) -> FeedEvent {
        let Some(outcome) = msg.asset_id.as_deref().and_then(|id| self.outcome_of(id)) else {
            return FeedEvent::Unrecognized;
        };

        let mut best: Option<Decimal> = None;
        for level in msg.bids.as_deref().unwrap_or_default() {
            let Some(price) = value_decimal(&level.price) else {
                return FeedEvent::DecodeError(format!("book bid price {}", level.price));
            };
            best = Some(best.map_or(price, |b| b.max(price)));
        }

        match best {
            Some(price) => price_tick(outcome, price, timestamp_ms),
            None => FeedEvent::OutcomeCleared {
                outcome,
                timestamp_ms,
            },
        }
    }

    fn decode_changes(&self, msg: MarketMessage, timestamp_ms: Option<u64>) -> Vec<FeedEvent> {
        let fallback_asset = msg.asset_id;
        let changes = msg
            .price_changes
            .or(msg.changes)
            .unwrap_or_default();

        changes
            .into_iter()
            .map(|change| {
                let asset = change.asset_id.as_deref().or(fallback_asset.as_deref());
                let Some(outcome) = asset.and_then(|id| self.outcome_of(id)) else {
                    return FeedEvent::Unrecognized;
                };

                let price = change
                    .best_bid
                    .as_ref()
                    .and_then(value_decimal)
                    .or_else(|| change.price.as_ref().and_then(value_decimal));

                match price {
                    Some(price) => price_tick(outcome, price, timestamp_ms),
                    None => FeedEvent::DecodeError("price_change without usable price".to_string()),
                }
            })
            .collect()
    }
}

/// Tick in cents; a price too large to rescale is a decode error.
fn price_tick(outcome: Outcome, price: Decimal, timestamp_ms: Option<u64>) -> FeedEvent {
    match price.checked_mul(PRICE_SCALE) {
        Some(price) => FeedEvent::PriceTick {
            outcome,
            price,
            timestamp_ms,
        },
        None => FeedEvent::DecodeError(format!("{outcome} price {price} out of range")),
    }
}

/// Decimal from a JSON string or number.
fn value_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

/// Millisecond stamp from a JSON string or number.
fn value_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[async_trait]
impl FeedProtocol for PolymarketProtocol {
    fn name(&self) -> &'static str {
        FEED_NAME
    }

    fn url(&self) -> &str {
        &self.config.ws_url
    }

    fn initial_state(&self) -> FeedState {
        FeedState::with_outcomes(FEED_NAME)
    }

    async fn prepare(&mut self) -> Result<Subscription, FeedError> {
        let market = self.resolver.resolve_now().await?;

        let subscribe = serde_json::to_string(&SubscribeMsg {
            assets_ids: [&market.up_token_id, &market.down_token_id],
            msg_type: "market",
        })
        .map_err(|e| FeedError::Configuration(format!("subscribe encoding: {e}")))?;

        let expires_at = market.expires_at();
        self.market = Some(market.clone());

        Ok(Subscription {
            messages: vec![subscribe],
            market: Some(market),
            expires_at: Some(expires_at),
        })
    }

    fn decode(&mut self, text: &str) -> Vec<FeedEvent> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("PONG") {
            return vec![FeedEvent::Heartbeat { counter: None }];
        }
        let is_json = trimmed.starts_with('{') || trimmed.starts_with('[');
        if !is_json && trimmed.contains("INVALID") {
            return vec![FeedEvent::InstrumentRejected(trimmed.to_string())];
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => return vec![FeedEvent::DecodeError(format!("invalid json: {e}"))],
        };

        let items = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            other => return vec![FeedEvent::DecodeError(format!("unexpected frame: {other}"))],
        };

        let mut out = Vec::new();
        for item in items {
            match serde_json::from_value::<MarketMessage>(item) {
                Ok(msg) => out.extend(self.decode_message(msg)),
                Err(e) => out.push(FeedEvent::DecodeError(format!("market message: {e}"))),
            }
        }
        if out.is_empty() {
            out.push(FeedEvent::Unrecognized);
        }
        out
    }

    fn keep_alive(&self) -> Option<KeepAlive> {
        Some(KeepAlive {
            payload: self.config.keep_alive_payload.clone(),
            settle: Duration::from_millis(self.config.keep_alive_settle_ms),
            interval: Duration::from_millis(self.config.keep_alive_interval_ms),
        })
    }
}
