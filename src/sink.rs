//! Consumers of closed sessions.

use crate::event_model::{Session, Timestamp};
use chrono::DateTime;
use std::io::{self, Write};
use thiserror::Error;

const OUTPUT_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Failure reported by a sink for a single call.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write session for {client_id}: {source}")]
    Io {
        client_id: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to flush sink: {0}")]
    Flush(#[source] io::Error),
    #[error("session for {client_id} rejected: {reason}")]
    Rejected { client_id: String, reason: String },
}

/// Receives closed sessions one at a time.
pub trait SessionSink {
    fn accept(&mut self, session: &Session) -> Result<(), SinkError>;

    /// Called once after the final session has been accepted.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every accepted session in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    sessions: Vec<Session>,
    finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn into_sessions(self) -> Vec<Session> {
        self.sessions
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl SessionSink for CollectingSink {
    fn accept(&mut self, session: &Session) -> Result<(), SinkError> {
        self.sessions.push(session.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }
}

/// Writes `ip,start,end,duration,requests` lines with UTC datetimes.
pub struct CsvSink<W: Write> {
    writer: W,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SessionSink for CsvSink<W> {
    fn accept(&mut self, session: &Session) -> Result<(), SinkError> {
        let line = format_session_line(session);
        self.writer
            .write_all(line.as_bytes())
            .map_err(|source| SinkError::Io {
                client_id: session.client_id.clone(),
                source,
            })
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(SinkError::Flush)
    }
}

/// Renders one output line, newline included.
pub fn format_session_line(session: &Session) -> String {
    format!(
        "{},{},{},{},{}\n",
        session.client_id,
        format_timestamp(session.start_time),
        format_timestamp(session.last_activity_time),
        session.inclusive_duration() as u64,
        session.request_count,
    )
}

fn format_timestamp(at: Timestamp) -> String {
    let secs = at.as_secs();
    let whole = secs.trunc() as i64;
    match DateTime::from_timestamp(whole, 0) {
        Some(dt) => dt.format(OUTPUT_DATETIME_FMT).to_string(),
        // Beyond chrono's range; fall back to raw seconds.
        None => secs.to_string(),
    }
}
