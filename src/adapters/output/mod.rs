//! Output Adapters - Comparison Sinks
//!
//! - `text`: plain operator lines on stdout
//! - `log_sink`: structured tracing events

pub mod log_sink;
pub mod text;

pub use log_sink::LogSink;
pub use text::TextSink;
