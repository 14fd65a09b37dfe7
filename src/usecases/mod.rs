//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with port interfaces.
//!
//! Use cases:
//! - `MarketResolver`: Active market of the rotating feed
//! - `Aggregator`: Cross-feed comparison behind the output gate

pub mod aggregator;
pub mod market_resolver;
