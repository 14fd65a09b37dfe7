//! Gamma API Adapter
//!
//! Resolves rotating up/down markets from their deterministic slug
//! through the Gamma events REST API.
//!
//! Sub-modules:
//! - `client`: HTTP client with retries implementing `MarketLookup`
//! - `types`: Gamma response type definitions

pub mod client;
pub mod types;

pub use client::{GammaClient, GammaClientConfig};
