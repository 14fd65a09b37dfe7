//! Coinbase WebSocket Feed - Level2 Order Book Protocol
//!
//! Subscribes to the Advanced Trade `level2` channel (and optionally
//! `heartbeats`) and decodes `l2_data` snapshots and updates into
//! canonical book events. Sequence numbers are tracked per connection;
//! a skipped number means the book missed an update and must resync.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::parse_decimal;
use crate::config::ExchangeConfig;
use crate::domain::error::FeedError;
use crate::domain::events::FeedEvent;
use crate::domain::feed_state::FeedState;
use crate::domain::order_book::{PriceLevel, Side};
use crate::ports::market_feed::{FeedProtocol, Subscription};

/// Feed name used in logs, metrics and snapshots.
pub const FEED_NAME: &str = "coinbase";

/// Coinbase WebSocket subscribe message.
#[derive(Serialize)]
struct SubscribeMsg<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    product_ids: &'a [String],
    channel: &'static str,
}

/// Envelope shared by every Advanced Trade message.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    channel: Option<String>,
    sequence_num: Option<u64>,
    message: Option<String>,
    #[serde(default)]
    events: Vec<Value>,
}

/// One `l2_data` event.
#[derive(Debug, Deserialize)]
struct L2Event {
    #[serde(rename = "type")]
    event_type: String,
    product_id: Option<String>,
    #[serde(default)]
    updates: Vec<L2Update>,
}

/// One level change inside an `l2_data` event.
#[derive(Debug, Deserialize)]
struct L2Update {
    side: String,
    price_level: String,
    new_quantity: String,
}

/// One `heartbeats` event.
#[derive(Debug, Deserialize)]
struct HeartbeatEvent {
    heartbeat_counter: Option<u64>,
}

/// Coinbase Advanced Trade level2 protocol.
pub struct CoinbaseProtocol {
    config: ExchangeConfig,
    product_ids: Vec<String>,
    /// Last sequence number seen on the current connection.
    last_sequence: Option<u64>,
}

impl CoinbaseProtocol {
    pub fn new(config: ExchangeConfig) -> Self {
        let product_ids = vec![config.product_id.clone()];
        Self {
            config,
            product_ids,
            last_sequence: None,
        }
    }

    /// Build the subscribe frames for this session.
    fn subscribe_messages(&self) -> Result<Vec<String>, FeedError> {
        let mut channels = vec!["level2"];
        if self.config.subscribe_heartbeats {
            channels.push("heartbeats");
        }

        channels
            .into_iter()
            .map(|channel| {
                serde_json::to_string(&SubscribeMsg {
                    msg_type: "subscribe",
                    product_ids: &self.product_ids,
                    channel,
                })
                .map_err(|e| FeedError::Configuration(format!("subscribe encoding: {e}")))
            })
            .collect()
    }

    /// Track `sequence_num`; returns the gap if numbers were skipped.
    fn check_sequence(&mut self, received: u64) -> Option<(u64, u64)> {
        let gap = match self.last_sequence.and_then(|last| last.checked_add(1)) {
            Some(expected) if received > expected => Some((expected, received)),
            _ => None,
        };
        self.last_sequence = Some(received);
        gap
    }

    fn decode_l2(&self, events: Vec<Value>) -> Vec<FeedEvent> {
        let mut out = Vec::new();

        for raw in events {
            let event: L2Event = match serde_json::from_value(raw) {
                Ok(event) => event,
                Err(e) => {
                    out.push(FeedEvent::DecodeError(format!("l2_data event: {e}")));
                    continue;
                }
            };

            if let Some(product) = &event.product_id {
                if !self.product_ids.contains(product) {
                    out.push(FeedEvent::Unrecognized);
                    continue;
                }
            }

            match event.event_type.as_str() {
                "snapshot" => out.push(decode_snapshot(&event.updates)),
                "update" => out.extend(event.updates.iter().map(decode_update)),
                other => {
                    debug!(event_type = other, "Ignoring l2_data event");
                    out.push(FeedEvent::Unrecognized);
                }
            }
        }

        out
    }
}

/// Full book from a snapshot event. Any malformed level rejects the
/// whole snapshot so a partial book is never installed.
fn decode_snapshot(updates: &[L2Update]) -> FeedEvent {
    let mut bids = Vec::new();
    let mut asks = Vec::new();

    for update in updates {
        let (side, level) = match parse_level(update) {
            Ok(parsed) => parsed,
            Err(reason) => return FeedEvent::DecodeError(format!("snapshot level: {reason}")),
        };
        match side {
            Side::Bid => bids.push(level),
            Side::Ask => asks.push(level),
        }
    }

    FeedEvent::Snapshot { bids, asks }
}

fn decode_update(update: &L2Update) -> FeedEvent {
    match parse_level(update) {
        Ok((side, level)) => FeedEvent::LevelUpdate {
            side,
            price: level.price,
            size: level.size,
        },
        Err(reason) => FeedEvent::DecodeError(format!("update level: {reason}")),
    }
}

fn parse_level(update: &L2Update) -> Result<(Side, PriceLevel), String> {
    let side = match update.side.as_str() {
        "bid" => Side::Bid,
        "offer" | "ask" => Side::Ask,
        other => return Err(format!("unknown side {other:?}")),
    };
    let price = parse_decimal(&update.price_level)
        .ok_or_else(|| format!("bad price_level {:?}", update.price_level))?;
    let size = parse_decimal(&update.new_quantity)
        .ok_or_else(|| format!("bad new_quantity {:?}", update.new_quantity))?;
    Ok((side, PriceLevel::new(price, size)))
}

#[async_trait]
impl FeedProtocol for CoinbaseProtocol {
    fn name(&self) -> &'static str {
        FEED_NAME
    }

    fn url(&self) -> &str {
        &self.config.ws_url
    }

    fn initial_state(&self) -> FeedState {
        FeedState::with_book(FEED_NAME)
    }

    async fn prepare(&mut self) -> Result<Subscription, FeedError> {
        self.last_sequence = None;
        Ok(Subscription {
            messages: self.subscribe_messages()?,
            market: None,
            expires_at: None,
        })
    }

    fn decode(&mut self, text: &str) -> Vec<FeedEvent> {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => return vec![FeedEvent::DecodeError(format!("invalid json: {e}"))],
        };

        if envelope.msg_type.as_deref() == Some("error") {
            let message = envelope.message.unwrap_or_else(|| "unspecified".to_string());
            return vec![FeedEvent::DecodeError(format!("server error: {message}"))];
        }

        if let Some(received) = envelope.sequence_num {
            if let Some((expected, received)) = self.check_sequence(received) {
                if self.config.resync_on_gap {
                    return vec![FeedEvent::SequenceGap { expected, received }];
                }
                warn!(expected, received, "Coinbase sequence gap ignored");
            }
        }

        match envelope.channel.as_deref() {
            Some("l2_data") => self.decode_l2(envelope.events),
            Some("heartbeats") => {
                let counter = envelope
                    .events
                    .into_iter()
                    .filter_map(|raw| serde_json::from_value::<HeartbeatEvent>(raw).ok())
                    .find_map(|event| event.heartbeat_counter);
                vec![FeedEvent::Heartbeat { counter }]
            }
            Some("subscriptions") => vec![FeedEvent::Heartbeat { counter: None }],
            _ => vec![FeedEvent::Unrecognized],
        }
    }

    fn on_disconnect(&mut self) {
        self.last_sequence = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn protocol() -> CoinbaseProtocol {
        CoinbaseProtocol::new(ExchangeConfig::default())
    }

    const SNAPSHOT: &str = r#"{
        "channel": "l2_data",
        "timestamp": "2024-05-01T12:00:00.000Z",
        "sequence_num": 0,
        "events": [{
            "type": "snapshot",
            "product_id": "BTC-USD",
            "updates": [
                {"side": "bid", "event_time": "2024-05-01T12:00:00Z", "price_level": "100.00", "new_quantity": "1.5"},
                {"side": "bid", "event_time": "2024-05-01T12:00:00Z", "price_level": "99.50", "new_quantity": "2"},
                {"side": "offer", "event_time": "2024-05-01T12:00:00Z", "price_level": "101.00", "new_quantity": "0.75"}
            ]
        }]
    }"#;

    #[tokio::test]
    async fn test_subscribe_messages() {
        let mut proto = protocol();
        let sub = proto.prepare().await.unwrap();
        assert_eq!(sub.messages.len(), 2);
        assert_eq!(
            sub.messages[0],
            r#"{"type":"subscribe","product_ids":["BTC-USD"],"channel":"level2"}"#
        );
        assert!(sub.messages[1].contains(r#""channel":"heartbeats""#));
        assert!(sub.market.is_none());
        assert!(sub.expires_at.is_none());
    }

    #[test]
    fn test_decode_snapshot() {
        let events = protocol().decode(SNAPSHOT);
        assert_eq!(
            events,
            vec![FeedEvent::Snapshot {
                bids: vec![
                    PriceLevel::new(dec!(100.00), dec!(1.5)),
                    PriceLevel::new(dec!(99.50), dec!(2)),
                ],
                asks: vec![PriceLevel::new(dec!(101.00), dec!(0.75))],
            }]
        );
    }

    #[test]
    fn test_decode_updates_one_event_per_level() {
        let mut proto = protocol();
        proto.decode(SNAPSHOT);
        let events = proto.decode(
            r#"{"channel":"l2_data","sequence_num":1,"events":[{"type":"update","product_id":"BTC-USD","updates":[
                {"side":"bid","price_level":"100.00","new_quantity":"0"},
                {"side":"offer","price_level":"100.50","new_quantity":".48"}
            ]}]}"#,
        );
        assert_eq!(
            events,
            vec![
                FeedEvent::LevelUpdate {
                    side: Side::Bid,
                    price: dec!(100.00),
                    size: dec!(0),
                },
                FeedEvent::LevelUpdate {
                    side: Side::Ask,
                    price: dec!(100.50),
                    size: dec!(0.48),
                },
            ]
        );
    }

    #[test]
    fn test_sequence_gap_detected() {
        let mut proto = protocol();
        proto.decode(SNAPSHOT);
        let events = proto.decode(r#"{"channel":"heartbeats","sequence_num":5,"events":[]}"#);
        assert_eq!(
            events,
            vec![FeedEvent::SequenceGap {
                expected: 1,
                received: 5
            }]
        );
    }

    #[test]
    fn test_sequence_restarts_after_disconnect() {
        let mut proto = protocol();
        proto.decode(SNAPSHOT);
        proto.on_disconnect();
        let events = proto.decode(r#"{"channel":"heartbeats","sequence_num":40,"events":[{"heartbeat_counter":7}]}"#);
        assert_eq!(events, vec![FeedEvent::Heartbeat { counter: Some(7) }]);
    }

    #[test]
    fn test_sequence_at_numeric_ceiling() {
        let mut proto = protocol();
        let max = u64::MAX;
        proto.decode(&format!(r#"{{"channel":"heartbeats","sequence_num":{},"events":[]}}"#, max - 2));
        let events = proto.decode(&format!(
            r#"{{"channel":"heartbeats","sequence_num":{max},"events":[]}}"#
        ));
        assert_eq!(
            events,
            vec![FeedEvent::SequenceGap {
                expected: max - 1,
                received: max
            }]
        );
        let events = proto.decode(&format!(
            r#"{{"channel":"heartbeats","sequence_num":{max},"events":[]}}"#
        ));
        assert_eq!(events, vec![FeedEvent::Heartbeat { counter: None }]);
    }

    #[test]
    fn test_gap_ignored_without_resync() {
        let mut proto = CoinbaseProtocol::new(ExchangeConfig {
            resync_on_gap: false,
            ..ExchangeConfig::default()
        });
        proto.decode(SNAPSHOT);
        let events = proto.decode(r#"{"channel":"subscriptions","sequence_num":9,"events":[]}"#);
        assert_eq!(events, vec![FeedEvent::Heartbeat { counter: None }]);
    }

    #[test]
    fn test_malformed_input_never_fails() {
        let mut proto = protocol();
        assert!(matches!(proto.decode("not json")[..], [FeedEvent::DecodeError(_)]));
        assert!(matches!(
            proto.decode(r#"{"type":"error","message":"rate limited"}"#)[..],
            [FeedEvent::DecodeError(_)]
        ));
        assert!(matches!(
            proto.decode(
                r#"{"channel":"l2_data","events":[{"type":"update","product_id":"BTC-USD","updates":[{"side":"sideways","price_level":"1","new_quantity":"1"}]}]}"#
            )[..],
            [FeedEvent::DecodeError(_)]
        ));
        assert_eq!(proto.decode(r#"{"channel":"ticker","events":[]}"#), vec![FeedEvent::Unrecognized]);
    }
}
