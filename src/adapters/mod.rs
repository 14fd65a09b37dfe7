//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, stdout). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: Gamma REST API market lookup
//! - `feeds`: Real-time market data (Coinbase, Polymarket WebSockets)
//! - `metrics`: Prometheus metrics export and health checks
//! - `output`: Comparison rendering for the operator

pub mod api;
pub mod feeds;
pub mod metrics;
pub mod output;
