use crate::event_model::{
    Event, ExpirationSchedule, ScheduleError, Session, SessionTable, Timestamp, TimestampError,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while folding events into sessions. All of them abort the
/// current event; none are retryable.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("inactivity timeout must be a finite number of seconds above zero, got {0}")]
    InvalidTimeout(f64),
    #[error("event for client {client_id} carries an unusable timestamp")]
    InvalidTimestamp {
        client_id: String,
        #[source]
        source: TimestampError,
    },
    #[error(
        "internal consistency: client {client_id} was scheduled at {scheduled} but its deadline is {deadline}"
    )]
    ScheduleInconsistency {
        client_id: String,
        scheduled: Timestamp,
        deadline: Timestamp,
    },
    #[error("internal consistency: {0}")]
    Schedule(#[from] ScheduleError),
}

/// Counters + gauges describing tracker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerTelemetry {
    pub clock_s: Option<f64>,
    pub open_sessions: usize,
    pub pending_entries: usize,
    pub pending_keys: usize,
    pub events_ingested: u64,
    pub late_events: u64,
    pub sessions_opened: u64,
    pub sessions_expired: u64,
    pub sessions_flushed: u64,
    pub stale_entries_discarded: u64,
}

#[derive(Debug, Default)]
struct TrackerCounters {
    events_ingested: u64,
    late_events: u64,
    sessions_opened: u64,
    sessions_expired: u64,
    sessions_flushed: u64,
    stale_entries_discarded: u64,
}

/// Folds an arrival-ordered event stream into inactivity-bounded sessions.
///
/// Time is the maximum event timestamp seen so far; sessions are closed only
/// when that clock moves forward. Refreshing a session queues a new
/// expiration entry and leaves the old one behind, so a swept entry is
/// checked against the session's current deadline before anything is
/// emitted.
#[derive(Debug)]
pub struct SessionTracker {
    timeout_s: f64,
    clock: Option<Timestamp>,
    sessions: SessionTable,
    schedule: ExpirationSchedule,
    next_sequence: u64,
    counters: TrackerCounters,
}

impl SessionTracker {
    /// Creates a tracker closing sessions after `timeout_s` seconds of
    /// inactivity.
    pub fn new(timeout_s: f64) -> Result<Self, TrackerError> {
        if !timeout_s.is_finite() || timeout_s <= 0.0 {
            return Err(TrackerError::InvalidTimeout(timeout_s));
        }
        Ok(Self {
            timeout_s,
            clock: None,
            sessions: SessionTable::new(),
            schedule: ExpirationSchedule::new(),
            next_sequence: 0,
            counters: TrackerCounters::default(),
        })
    }

    /// Applies one event and returns the sessions it caused to expire, in
    /// increasing expiration order.
    pub fn ingest(&mut self, event: &Event) -> Result<Vec<Session>, TrackerError> {
        let at =
            Timestamp::new(event.timestamp).map_err(|source| TrackerError::InvalidTimestamp {
                client_id: event.client_id.clone(),
                source,
            })?;
        self.counters.events_ingested += 1;

        let expired = match self.clock {
            Some(clock) if at <= clock => {
                if at < clock {
                    self.counters.late_events += 1;
                }
                Vec::new()
            }
            _ => {
                self.clock = Some(at);
                self.sweep(at)?
            }
        };

        self.record_activity(&event.client_id, at);
        Ok(expired)
    }

    /// Closes every open session, oldest-opened first. The tracker is empty
    /// afterwards, so a second call returns nothing.
    pub fn finalize(&mut self) -> Vec<Session> {
        let flushed = self.sessions.drain_in_open_order();
        self.schedule.clear();
        self.counters.sessions_flushed += flushed.len() as u64;
        flushed
    }

    /// Maximum event timestamp observed so far.
    pub fn clock(&self) -> Option<Timestamp> {
        self.clock
    }

    pub fn timeout_s(&self) -> f64 {
        self.timeout_s
    }

    /// Current state of an open session.
    pub fn session(&self, client_id: &str) -> Option<&Session> {
        self.sessions.get(client_id)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Queued expiration entries, stale ones included.
    pub fn pending_entries(&self) -> usize {
        self.schedule.len()
    }

    pub fn telemetry(&self) -> TrackerTelemetry {
        TrackerTelemetry {
            clock_s: self.clock.map(Timestamp::as_secs),
            open_sessions: self.sessions.len(),
            pending_entries: self.schedule.len(),
            pending_keys: self.schedule.key_count(),
            events_ingested: self.counters.events_ingested,
            late_events: self.counters.late_events,
            sessions_opened: self.counters.sessions_opened,
            sessions_expired: self.counters.sessions_expired,
            sessions_flushed: self.counters.sessions_flushed,
            stale_entries_discarded: self.counters.stale_entries_discarded,
        }
    }

    fn sweep(&mut self, now: Timestamp) -> Result<Vec<Session>, TrackerError> {
        let mut expired = Vec::new();
        for entry in self.schedule.pop_due(now)? {
            let Some(session) = self.sessions.get(&entry.client_id) else {
                self.counters.stale_entries_discarded += 1;
                continue;
            };
            let deadline = session.deadline(self.timeout_s);
            if deadline < entry.expires_at {
                return Err(TrackerError::ScheduleInconsistency {
                    client_id: entry.client_id,
                    scheduled: entry.expires_at,
                    deadline,
                });
            }
            if deadline > entry.expires_at {
                // Refreshed since this entry was queued. The live entry sits
                // at a later key, possibly inside this same sweep.
                self.counters.stale_entries_discarded += 1;
                continue;
            }
            let session = self.sessions.remove(&entry.client_id).ok_or_else(|| {
                TrackerError::ScheduleInconsistency {
                    client_id: entry.client_id.clone(),
                    scheduled: entry.expires_at,
                    deadline,
                }
            })?;
            self.counters.sessions_expired += 1;
            expired.push(session);
        }
        Ok(expired)
    }

    fn record_activity(&mut self, client_id: &str, at: Timestamp) {
        match self.sessions.get_mut(client_id) {
            Some(session) => {
                // A late event leaves the deadline untouched and its entry
                // already queued.
                if session.touch(at) {
                    self.schedule
                        .insert(session.deadline(self.timeout_s), client_id);
                }
            }
            None => {
                let session = Session::open(client_id, at, self.next_sequence);
                self.next_sequence += 1;
                self.counters.sessions_opened += 1;
                self.schedule
                    .insert(session.deadline(self.timeout_s), client_id);
                self.sessions.insert(session);
            }
        }
    }
}
