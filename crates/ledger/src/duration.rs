//! Duration policy for deciding which files get truncated.
//!
//! Manifests record durations as `H:MM:SS[.fraction]`. Files whose length
//! falls on one of a configured set of minute marks (with zero hours) are
//! capped at a fixed length when encoded.

use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    /// Timestamp is not three colon-separated numeric components.
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// A parsed `H:MM:SS` timestamp. Fractional seconds are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Timestamp {
    pub fn parse(text: &str) -> Result<Self, DurationError> {
        let invalid = || DurationError::InvalidTimestamp(text.to_string());

        let parts: Vec<&str> = text.trim().split(':').collect();
        let [hours, minutes, seconds] = parts.as_slice() else {
            return Err(invalid());
        };

        let whole_seconds = match seconds.split_once('.') {
            Some((whole, fraction)) => {
                if !fraction.is_empty() && !fraction.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                whole
            }
            None => seconds,
        };

        Ok(Self {
            hours: hours.parse().map_err(|_| invalid())?,
            minutes: minutes.parse().map_err(|_| invalid())?,
            seconds: whole_seconds.parse().map_err(|_| invalid())?,
        })
    }

    pub fn as_duration(&self) -> std::time::Duration {
        let secs = u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds);
        std::time::Duration::from_secs(secs)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h{}m{}s", self.hours, self.minutes, self.seconds)
    }
}

/// Truncation rule: which lengths qualify and what they are capped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncationPolicy {
    eligible_minutes: BTreeSet<u32>,
    truncate_to_minutes: u32,
}

impl TruncationPolicy {
    pub fn new(eligible_minutes: impl IntoIterator<Item = u32>, truncate_to_minutes: u32) -> Self {
        Self {
            eligible_minutes: eligible_minutes.into_iter().collect(),
            truncate_to_minutes,
        }
    }

    /// True iff the duration has zero hours and its minute mark is eligible.
    pub fn should_truncate(&self, duration: &Timestamp) -> bool {
        duration.hours == 0 && self.eligible_minutes.contains(&duration.minutes)
    }

    pub fn truncate_to_minutes(&self) -> u32 {
        self.truncate_to_minutes
    }

    /// Encoder time-limit value, `MM:00`.
    pub fn time_limit(&self) -> String {
        format!("{}:00", self.truncate_to_minutes)
    }
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self::new([39, 40, 41], 32)
    }
}
