//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `FeedProtocol`: WebSocket feed wire protocols
//! - `MarketLookup`: Slug to instrument resolution
//! - `ComparisonSink`: Operator-facing output

pub mod market_feed;
pub mod market_lookup;
pub mod output;
