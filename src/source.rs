//! Event sources feeding the tracker.

use crate::event_model::Event;
use chrono::NaiveDateTime;
use std::collections::VecDeque;
use std::io::{self, BufRead};
use thiserror::Error;

const EDGAR_DATETIME_FMT: &str = "%Y-%m-%dT%H:%M:%S";
const EDGAR_MIN_FIELDS: usize = 7;

/// Errors surfaced while pulling the next event. Line numbers are 1-based and
/// count the header.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("bad record at line {line}: expected {expected} fields, found {found}")]
    MissingField {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line} is not valid UTF-8")]
    InvalidEncoding { line: usize },
    #[error("unterminated quoted field at line {line}")]
    UnterminatedQuote { line: usize },
    #[error("bad time format at line {line}: {value}")]
    BadTimestamp { line: usize, value: String },
    #[error("unsupported time zone {zone:?} at line {line}; only 0 is accepted")]
    UnsupportedZone { line: usize, zone: String },
    #[error("source is exhausted")]
    Exhausted,
}

impl SourceError {
    /// True when the error concerns a single malformed record rather than the
    /// underlying stream.
    pub fn is_malformed_record(&self) -> bool {
        matches!(
            self,
            SourceError::MissingField { .. }
                | SourceError::InvalidEncoding { .. }
                | SourceError::UnterminatedQuote { .. }
                | SourceError::BadTimestamp { .. }
                | SourceError::UnsupportedZone { .. }
        )
    }
}

/// Pull-based producer of events.
pub trait EventSource {
    /// Returns true while another call to `next_event` may yield data.
    fn has_next(&self) -> bool;

    /// Produces the next event.
    fn next_event(&mut self) -> Result<Event, SourceError>;
}

/// In-memory source replaying a fixed list of events.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    events: VecDeque<Event>,
}

impl VecSource {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

impl EventSource for VecSource {
    fn has_next(&self) -> bool {
        !self.events.is_empty()
    }

    fn next_event(&mut self) -> Result<Event, SourceError> {
        self.events.pop_front().ok_or(SourceError::Exhausted)
    }
}

/// Reads EDGAR access-log CSV.
///
/// Records look like `ip,date,time,zone,cik,accession,extention,...`. The
/// header line is skipped, timestamps are read as UTC and only zone `0` is
/// accepted. Fields may be double-quoted with `""` escapes; a record never
/// spans lines. One line of lookahead backs `has_next`.
pub struct CsvSource<R> {
    reader: R,
    line_no: usize,
    next_line: Option<(usize, Result<String, SourceError>)>,
}

impl<R: BufRead> CsvSource<R> {
    /// Wraps a reader, consuming the header line.
    pub fn new(reader: R) -> Result<Self, SourceError> {
        let mut csv = Self {
            reader,
            line_no: 0,
            next_line: None,
        };
        if let Some((_, Err(err @ SourceError::Io { .. }))) = csv.read_line() {
            return Err(err);
        }
        csv.next_line = csv.read_record_line();
        Ok(csv)
    }

    // Bytes first: a badly encoded line is consumed and reported on its own.
    fn read_line(&mut self) -> Option<(usize, Result<String, SourceError>)> {
        let mut buf = Vec::new();
        let read = self.reader.read_until(b'\n', &mut buf);
        if matches!(read, Ok(0)) {
            return None;
        }
        self.line_no += 1;
        let line = self.line_no;
        match read {
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let decoded =
                    String::from_utf8(buf).map_err(|_| SourceError::InvalidEncoding { line });
                Some((line, decoded))
            }
            Err(source) => Some((line, Err(SourceError::Io { line, source }))),
        }
    }

    fn read_record_line(&mut self) -> Option<(usize, Result<String, SourceError>)> {
        loop {
            match self.read_line()? {
                (_, Ok(line)) if line.trim().is_empty() => continue,
                other => return Some(other),
            }
        }
    }
}

impl<R: BufRead> EventSource for CsvSource<R> {
    fn has_next(&self) -> bool {
        self.next_line.is_some()
    }

    fn next_event(&mut self) -> Result<Event, SourceError> {
        let (line, current) = self.next_line.take().ok_or(SourceError::Exhausted)?;
        self.next_line = self.read_record_line();
        parse_edgar_record(line, &current?)
    }
}

/// Parses a single EDGAR log line into an event.
pub fn parse_edgar_record(line: usize, record: &str) -> Result<Event, SourceError> {
    let fields = split_fields(line, record)?;
    if fields.len() < EDGAR_MIN_FIELDS {
        return Err(SourceError::MissingField {
            line,
            expected: EDGAR_MIN_FIELDS,
            found: fields.len(),
        });
    }
    let (ip, date, time, zone) = (&fields[0], &fields[1], &fields[2], &fields[3]);
    match zone.trim().parse::<f64>() {
        Ok(offset) if offset == 0.0 => {}
        _ => {
            return Err(SourceError::UnsupportedZone {
                line,
                zone: zone.to_string(),
            })
        }
    }
    let stamp = format!("{}T{}", date.trim(), time.trim());
    let parsed = NaiveDateTime::parse_from_str(&stamp, EDGAR_DATETIME_FMT).map_err(|_| {
        SourceError::BadTimestamp {
            line,
            value: stamp.clone(),
        }
    })?;
    let secs = parsed.and_utc().timestamp();
    if secs < 0 {
        return Err(SourceError::BadTimestamp { line, value: stamp });
    }
    Ok(Event::new(ip.trim(), secs as f64))
}

/// Splits one record on commas, honouring double-quoted fields.
fn split_fields(line: usize, record: &str) -> Result<Vec<String>, SourceError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = record.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.is_empty() => quoted = true,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            other => field.push(other),
        }
    }
    if quoted {
        return Err(SourceError::UnterminatedQuote { line });
    }
    fields.push(field);
    Ok(fields)
}
