//! Half-open UTC time windows used for both fetch scheduling and gold aggregation.

use crate::config::ConfigError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open UTC window `[start, end)`. Immutable once issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Create a window, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Trailing window `[now - minutes, now)` for incremental fetches.
    pub fn trailing(now: DateTime<Utc>, minutes: i64) -> Result<Self, ConfigError> {
        if minutes <= 0 {
            return Err(ConfigError::InvalidParameter {
                name: "timespan_minutes",
                reason: format!("must be positive, got {minutes}"),
            });
        }
        Self::new(now - Duration::minutes(minutes), now)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open containment check.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_inverted_window() {
        let t0 = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 11, 2, 0, 0, 0).unwrap();
        assert!(FetchWindow::new(t1, t0).is_err());
        assert!(FetchWindow::new(t0, t0).is_err());
        assert!(FetchWindow::new(t0, t1).is_ok());
    }

    #[test]
    fn trailing_window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap();
        let w = FetchWindow::trailing(now, 15).unwrap();
        assert_eq!(w.duration(), Duration::minutes(15));
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn trailing_rejects_nonpositive_timespan() {
        let now = Utc.with_ymd_and_hms(2024, 11, 1, 12, 0, 0).unwrap();
        assert!(FetchWindow::trailing(now, 0).is_err());
        assert!(FetchWindow::trailing(now, -5).is_err());
    }
}
