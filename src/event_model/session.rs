use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Raw activity record handed to the tracker by an event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub client_id: String,
    pub timestamp: f64,
}

impl Event {
    pub fn new(client_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            client_id: client_id.into(),
            timestamp,
        }
    }
}

/// Burst of activity from a single client.
///
/// Live while held by the session table; once emitted by the tracker the
/// record is closed and never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub client_id: String,
    pub start_time: Timestamp,
    pub last_activity_time: Timestamp,
    pub request_count: u64,
    /// Tracker-wide open order.
    pub sequence: u64,
}

impl Session {
    pub(crate) fn open(client_id: impl Into<String>, at: Timestamp, sequence: u64) -> Self {
        Self {
            client_id: client_id.into(),
            start_time: at,
            last_activity_time: at,
            request_count: 1,
            sequence,
        }
    }

    /// Folds another event into the session. Returns true when the last
    /// activity moved forward (and therefore the deadline changed).
    pub(crate) fn touch(&mut self, at: Timestamp) -> bool {
        self.request_count = self.request_count.saturating_add(1);
        if at < self.start_time {
            self.start_time = at;
        }
        if at > self.last_activity_time {
            self.last_activity_time = at;
            return true;
        }
        false
    }

    /// Instant at which the session expires without further activity.
    pub fn deadline(&self, timeout_s: f64) -> Timestamp {
        self.last_activity_time.saturating_add(timeout_s)
    }

    /// Session length in seconds counting both boundary seconds.
    pub fn inclusive_duration(&self) -> f64 {
        self.last_activity_time.as_secs() - self.start_time.as_secs() + 1.0
    }
}
