//! Domain layer - Core synchronization logic and models.
//!
//! Pure feed state: order books, outcome prices, market windows, the
//! connection state machine and the cross-feed comparison. No IO here
//! (hexagonal architecture inner ring); everything is testable in
//! isolation.

pub mod comparison;
pub mod connection;
pub mod error;
pub mod events;
pub mod feed_state;
pub mod order_book;
pub mod price_state;
pub mod window;

// Re-export core types for convenience
pub use comparison::{Comparison, ExchangeQuote, OutcomeQuote};
pub use connection::{Backoff, ConnectionEvent, ConnectionStatus};
pub use error::FeedError;
pub use events::FeedEvent;
pub use feed_state::{FeedSnapshot, FeedState, PriceView};
pub use order_book::{OrderBook, PriceLevel, Side};
pub use price_state::{Outcome, ScalarPriceState};
pub use window::{ActiveMarket, MarketWindow};
