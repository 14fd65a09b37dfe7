//! Connection Lifecycle - Supervisor State Machine
//!
//! Pure transition function for one feed connection plus the bounded
//! exponential backoff used between attempts. Kept free of IO so the
//! reconnect policy is testable without a socket.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Connection status of one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Subscribed,
    /// Connected but silent past the staleness timeout.
    Degraded,
    /// Terminal: shutdown or unrecoverable configuration.
    Stopped,
}

impl ConnectionStatus {
    /// Numeric code exported as a gauge.
    pub fn code(self) -> i64 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Subscribed => 2,
            Self::Degraded => 3,
            Self::Stopped => 4,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Start, or backoff elapsed.
    Connect,
    /// Socket open and subscription frames sent.
    Subscribed,
    /// Any inbound frame.
    MessageReceived,
    /// Keep-alive frame written.
    KeepAliveSent,
    /// Silence past the staleness timeout.
    StaleTimeout,
    /// Transport error or deliberate close.
    ConnectionLost,
    /// Global shutdown signal.
    Shutdown,
    /// Unrecoverable configuration error.
    FatalError,
}

/// Event not valid in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event:?}")]
pub struct TransitionError {
    pub from: ConnectionStatus,
    pub event: ConnectionEvent,
}

/// Compute the next status.
pub fn transition(
    from: ConnectionStatus,
    event: ConnectionEvent,
) -> Result<ConnectionStatus, TransitionError> {
    use ConnectionEvent as E;
    use ConnectionStatus as S;

    let next = match (from, event) {
        (S::Stopped, _) => return Err(TransitionError { from, event }),
        (_, E::Shutdown | E::FatalError) => S::Stopped,

        (S::Disconnected, E::Connect) => S::Connecting,
        (S::Connecting, E::Subscribed) => S::Subscribed,

        (S::Subscribed, E::MessageReceived | E::KeepAliveSent) => S::Subscribed,
        (S::Subscribed, E::StaleTimeout) => S::Degraded,
        (S::Degraded, E::MessageReceived) => S::Subscribed,
        (S::Degraded, E::KeepAliveSent | E::StaleTimeout) => S::Degraded,

        (S::Connecting | S::Subscribed | S::Degraded, E::ConnectionLost) => S::Disconnected,

        _ => return Err(TransitionError { from, event }),
    };
    Ok(next)
}

/// Bounded exponential backoff: base, 2×base, 4×base … capped at max.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Back to the base delay after a healthy session.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
