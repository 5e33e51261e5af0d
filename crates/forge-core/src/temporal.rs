//! # Temporal Types: UTC-Only Timestamps
//!
//! `Timestamp` is a UTC-only timestamp truncated to millisecond precision.
//! Audit records are ordered by timestamp, so sub-second precision is kept;
//! anything finer than a millisecond is dropped so that the rendered form and
//! the hashed form of a record agree exactly.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A UTC-only timestamp, truncated to milliseconds.
///
/// # Construction
///
/// - [`Timestamp::now()`]: current UTC time.
/// - [`Timestamp::from_utc()`]: from a `DateTime<Utc>`.
///
/// Wire form is RFC 3339 via serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// Wrap a `DateTime<Utc>`, truncating below milliseconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_millis(dt))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The later of `self` and `floor`.
    ///
    /// Used to keep per-entity audit timestamps non-decreasing when the
    /// wall clock steps backwards.
    pub fn at_least(self, floor: Timestamp) -> Timestamp {
        if self < floor {
            floor
        } else {
            self
        }
    }

    /// Render as RFC 3339 with millisecond precision and `Z` suffix.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    let millis = dt.nanosecond() / 1_000_000 * 1_000_000;
    dt.with_nanosecond(millis).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32, nanos: u32) -> Timestamp {
        let dt = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 15, secs)
            .unwrap()
            .with_nanosecond(nanos)
            .unwrap();
        Timestamp::from_utc(dt)
    }

    #[test]
    fn now_is_truncated_to_millis() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn from_utc_truncates_micros() {
        assert_eq!(at(0, 123_456_789).to_rfc3339(), "2026-03-01T09:15:00.123Z");
    }

    #[test]
    fn display_uses_z_suffix() {
        assert_eq!(at(0, 500_000_000).to_string(), "2026-03-01T09:15:00.500Z");
    }

    #[test]
    fn at_least_clamps_backwards_clock() {
        let early = at(0, 0);
        let late = at(1, 0);
        assert_eq!(early.at_least(late), late);
        assert_eq!(late.at_least(early), late);
    }

    #[test]
    fn serde_roundtrip_preserves_millis() {
        let ts = at(0, 42_000_000);
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, back);
    }
}
