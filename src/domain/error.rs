//! Feed Error Taxonomy
//!
//! Classified failures for the synchronization engine. Per-message
//! errors are contained at the normalizer boundary; only
//! `Configuration` is allowed to escape a supervisor.

use thiserror::Error;

/// Errors produced while keeping one feed alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// A frame could not be decoded. Logged and skipped.
    #[error("decode error: {0}")]
    Decode(String),

    /// Connection dropped or an IO operation failed. Triggers reconnect.
    #[error("transport error: {0}")]
    Transport(String),

    /// The instrument lookup returned nothing usable yet. Retried.
    #[error("no active market published for {slug}")]
    ResolutionUnavailable { slug: String },

    /// No message arrived within the staleness timeout.
    #[error("feed stale: no message for {silent_ms} ms")]
    StaleFeed { silent_ms: u64 },

    /// Unrecoverable misconfiguration. Stops this feed only.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FeedError {
    /// Whether this error must stop the feed's worker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Transport(_) => "transport",
            Self::ResolutionUnavailable { .. } => "resolution_unavailable",
            Self::StaleFeed { .. } => "stale",
            Self::Configuration(_) => "configuration",
        }
    }
}
