//! The sync token: a scalar "something changed after T" signal.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch-millisecond token broadcast after every push.
///
/// Devices compare the remote token against the newest token they have
/// merged; an equal or older remote token means the pull can be skipped.
///
/// Wall clocks across devices can disagree, so a publishing device never
/// emits a token at or below one it has already observed (see
/// [`SyncToken::next_after`]).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SyncToken(u64);

impl SyncToken {
    /// The token of a device that has never synced.
    pub const ZERO: SyncToken = SyncToken(0);

    /// Creates a token from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the token as epoch milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns a token for the given wall-clock time.
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self(u64::try_from(time.timestamp_millis()).unwrap_or(0))
    }

    /// Returns a token for the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Returns the token to publish next: the current time, but strictly
    /// newer than `observed`.
    #[must_use]
    pub fn next_after(observed: SyncToken, now: SyncToken) -> SyncToken {
        now.max(SyncToken(observed.0.saturating_add(1)))
    }

    /// Returns true if this token is strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: SyncToken) -> bool {
        self.0 > other.0
    }

    /// Returns the wall-clock time this token encodes.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.0).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_token_uses_clock_when_ahead() {
        let next = SyncToken::next_after(SyncToken::from_millis(100), SyncToken::from_millis(500));
        assert_eq!(next, SyncToken::from_millis(500));
    }

    #[test]
    fn next_token_stays_ahead_of_observed_when_clock_lags() {
        let observed = SyncToken::from_millis(1_000);
        let next = SyncToken::next_after(observed, SyncToken::from_millis(400));
        assert!(next.is_newer_than(observed));
        assert_eq!(next, SyncToken::from_millis(1_001));
    }

    #[test]
    fn token_time_conversion() {
        let time = Utc.with_ymd_and_hms(2026, 10, 1, 8, 30, 0).unwrap();
        let token = SyncToken::at(time);
        assert_eq!(token.to_datetime(), Some(time));
        assert!(!SyncToken::ZERO.is_newer_than(SyncToken::ZERO));
    }
}
