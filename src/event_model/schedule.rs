use super::timestamp::Timestamp;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use thiserror::Error;

/// Scheduled check of one client at one instant. The entry may be stale: the
/// client could have been refreshed or closed since it was queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationEntry {
    pub expires_at: Timestamp,
    pub client_id: String,
}

/// Raised when the key index and the bucket map disagree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("expiration key {0} is indexed but has no bucket")]
    MissingBucket(Timestamp),
}

/// Expiration buckets keyed by instant, plus a min-heap over the distinct
/// pending keys so due buckets can be drained in increasing time order.
///
/// Every key in `keys` has exactly one bucket in `buckets` and vice versa.
#[derive(Debug, Default)]
pub struct ExpirationSchedule {
    buckets: HashMap<Timestamp, VecDeque<String>>,
    keys: BinaryHeap<Reverse<Timestamp>>,
    entries: usize,
}

impl ExpirationSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `client_id` for a check at `expires_at`. Earlier entries for the
    /// same client are left in place.
    pub fn insert(&mut self, expires_at: Timestamp, client_id: impl Into<String>) {
        let bucket = self.buckets.entry(expires_at).or_insert_with(|| {
            self.keys.push(Reverse(expires_at));
            VecDeque::new()
        });
        bucket.push_back(client_id.into());
        self.entries += 1;
    }

    /// Removes every entry keyed at or before `now`, ordered by key and then
    /// by insertion order within a key.
    pub fn pop_due(&mut self, now: Timestamp) -> Result<Vec<ExpirationEntry>, ScheduleError> {
        let mut due = Vec::new();
        while let Some(&Reverse(key)) = self.keys.peek() {
            if key > now {
                break;
            }
            self.keys.pop();
            let bucket = self
                .buckets
                .remove(&key)
                .ok_or(ScheduleError::MissingBucket(key))?;
            self.entries = self.entries.saturating_sub(bucket.len());
            due.extend(bucket.into_iter().map(|client_id| ExpirationEntry {
                expires_at: key,
                client_id,
            }));
        }
        Ok(due)
    }

    /// Earliest pending key, if any.
    pub fn next_key(&self) -> Option<Timestamp> {
        self.keys.peek().map(|Reverse(key)| *key)
    }

    /// Number of queued entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of distinct pending keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.keys.clear();
        self.entries = 0;
    }
}
