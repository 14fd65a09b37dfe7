//! Market Data Feed Adapters - Real-time Price Streaming
//!
//! Provides WebSocket-based feeds from:
//! - Coinbase: level2 order book of the reference product
//! - Polymarket: outcome prices of the rotating up/down market
//! - Task Supervisor: Manages feed lifecycle with auto-reconnect

pub mod coinbase;
pub mod polymarket;
pub mod task_supervisor;

use std::str::FromStr;

use rust_decimal::Decimal;

pub use coinbase::CoinbaseProtocol;
pub use polymarket::PolymarketProtocol;
pub use task_supervisor::{ConnectionSupervisor, SupervisorConfig};

/// Parse a decimal string as sent on the wire, including `.48` and
/// scientific notation.
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let normalized = if raw.starts_with('.') {
        format!("0{raw}")
    } else {
        raw.to_string()
    };
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}
