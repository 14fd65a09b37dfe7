//! Market Windows - Rotating Instrument Time Slots
//!
//! The up/down market rotates on a fixed window. Every caller derives the
//! active window from the wall clock alone, so concurrent callers agree
//! without coordination.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Longest supported window (one week).
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Fixed-length window schedule plus the slug convention of its markets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketWindow {
    length_secs: i64,
    slug_prefix: String,
}

impl MarketWindow {
    /// Create a schedule. `length_secs` is clamped to `1..=MAX_WINDOW_SECS`.
    pub fn new(length_secs: u64, slug_prefix: impl Into<String>) -> Self {
        Self {
            length_secs: length_secs.clamp(1, MAX_WINDOW_SECS) as i64,
            slug_prefix: slug_prefix.into(),
        }
    }

    /// Window length in seconds.
    pub fn length_secs(&self) -> i64 {
        self.length_secs
    }

    /// Start of the window containing `now_secs` (Unix seconds).
    pub fn current_window_start(&self, now_secs: i64) -> i64 {
        now_secs.div_euclid(self.length_secs) * self.length_secs
    }

    /// Exclusive end of the window starting at `window_start`.
    pub fn window_end(&self, window_start: i64) -> i64 {
        window_start.saturating_add(self.length_secs)
    }

    /// Deterministic market slug for a window, e.g. `btc-updown-15m-1700000100`.
    pub fn slug(&self, window_start: i64) -> String {
        format!("{}-{}", self.slug_prefix, window_start)
    }
}

/// The instrument currently quoted on the rotating feed.
///
/// Superseded, never mutated, when the window rolls over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMarket {
    /// Token id of the "up" outcome.
    pub up_token_id: String,
    /// Token id of the complementary "down" outcome.
    pub down_token_id: String,
    /// Human-readable market question.
    pub label: String,
    /// Slug the market was resolved from.
    pub slug: String,
    /// Window start (Unix seconds).
    pub window_start: i64,
    /// Window end (Unix seconds), always `window_start + length`.
    pub window_end: i64,
}

impl ActiveMarket {
    /// Window end as a UTC timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.window_end, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> MarketWindow {
        MarketWindow::new(900, "btc-updown-15m")
    }

    #[test]
    fn test_window_start_scenarios() {
        let w = window();
        assert_eq!(w.current_window_start(905), 900);
        assert_eq!(w.current_window_start(1800), 1800);
        assert_eq!(w.current_window_start(1799), 900);
        assert_eq!(w.current_window_start(0), 0);
    }

    #[test]
    fn test_window_start_shifts_by_one_length() {
        let w = window();
        for now in [1, 899, 1_700_000_123, 1_700_000_999] {
            assert_eq!(
                w.current_window_start(now + 900) - w.current_window_start(now),
                900
            );
            assert_eq!(w.current_window_start(now), w.current_window_start(now));
        }
    }

    #[test]
    fn test_slug_and_end() {
        let w = window();
        assert_eq!(w.slug(1_700_000_100), "btc-updown-15m-1700000100");
        assert_eq!(w.window_end(900), 1800);
    }

    #[test]
    fn test_length_is_clamped() {
        assert_eq!(MarketWindow::new(0, "x").length_secs(), 1);
        assert_eq!(
            MarketWindow::new(u64::MAX, "x").length_secs(),
            MAX_WINDOW_SECS as i64
        );
        let w = MarketWindow::new(1 << 63, "x");
        assert!(w.length_secs() > 0);
        assert_eq!(w.current_window_start(1_700_000_000) % w.length_secs(), 0);
    }

    #[test]
    fn test_active_market_expiry() {
        let market = ActiveMarket {
            up_token_id: "111".into(),
            down_token_id: "222".into(),
            label: "BTC Up or Down".into(),
            slug: "btc-updown-15m-900".into(),
            window_start: 900,
            window_end: 1800,
        };
        assert_eq!(market.expires_at().timestamp(), 1800);
    }
}
