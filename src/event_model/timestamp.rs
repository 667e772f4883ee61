use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Event-time instant expressed in seconds.
///
/// Always finite and non-negative, which is what makes the total order and
/// bitwise hashing below sound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Timestamp(f64);

impl Timestamp {
    /// Earliest representable instant.
    pub const ZERO: Timestamp = Timestamp(0.0);

    /// Validates a raw seconds value.
    pub fn new(secs: f64) -> Result<Self, TimestampError> {
        if !secs.is_finite() {
            return Err(TimestampError::NotFinite(secs));
        }
        if secs < 0.0 {
            return Err(TimestampError::Negative(secs));
        }
        // -0.0 compares equal to 0.0 but hashes differently.
        Ok(Self(if secs == 0.0 { 0.0 } else { secs }))
    }

    /// Raw seconds value.
    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Adds a non-negative duration, saturating at `f64::MAX`.
    pub fn saturating_add(self, secs: f64) -> Self {
        let sum = self.0 + secs;
        if sum.is_finite() {
            Self(sum)
        } else {
            Self(f64::MAX)
        }
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl TryFrom<f64> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Timestamp> for f64 {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

/// Rejections raised when a raw value cannot be used as event time.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp {0} is not a finite number")]
    NotFinite(f64),
    #[error("timestamp {0} is negative")]
    Negative(f64),
}
