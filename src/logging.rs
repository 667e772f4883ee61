use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use thiserror::Error;

/// Severity levels accepted by the logger and the `log_level` config knob.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size-based rotation policy for retained log segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogRotationPolicy {
    pub max_bytes: usize,
    pub max_files: usize,
}

impl Default for LogRotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 1 << 20,
            max_files: 4,
        }
    }
}

/// One retained log segment.
#[derive(Debug, Default, Clone)]
pub struct LogFile {
    lines: Vec<String>,
    bytes_written: usize,
}

impl LogFile {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// Contextual fields attached to a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogContext<'a> {
    pub client_id: Option<&'a str>,
    pub clock_s: Option<f64>,
}

impl<'a> LogContext<'a> {
    pub fn client(client_id: &'a str) -> Self {
        Self {
            client_id: Some(client_id),
            clock_s: None,
        }
    }

    pub fn with_clock(mut self, clock_s: Option<f64>) -> Self {
        self.clock_s = clock_s;
        self
    }
}

/// JSON-line logger keeping a bounded history of rotated segments.
///
/// A mirror writer, when set, receives every kept line as it is logged, so
/// nothing is lost to rotation or to a run that ends in an error.
pub struct JsonLineLogger {
    policy: LogRotationPolicy,
    current_level: LogLevel,
    files: VecDeque<LogFile>,
    active: LogFile,
    mirror: Option<Box<dyn Write + Send>>,
}

impl fmt::Debug for JsonLineLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLineLogger")
            .field("policy", &self.policy)
            .field("current_level", &self.current_level)
            .field("files", &self.files)
            .field("active", &self.active)
            .field("mirrored", &self.mirror.is_some())
            .finish()
    }
}

impl JsonLineLogger {
    pub fn new(policy: LogRotationPolicy) -> Self {
        Self {
            policy,
            current_level: LogLevel::Info,
            files: VecDeque::new(),
            active: LogFile::default(),
            mirror: None,
        }
    }

    /// Streams every kept line to `writer` in addition to the in-memory
    /// segments.
    pub fn mirror_to(&mut self, writer: impl Write + Send + 'static) {
        self.mirror = Some(Box::new(writer));
    }

    pub fn level(&self) -> LogLevel {
        self.current_level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.current_level = level;
    }

    /// True when a record at `level` would be kept.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.current_level
    }

    /// Appends a JSON-line record.
    pub fn log(
        &mut self,
        ts_ms: i64,
        level: LogLevel,
        module: &str,
        context: LogContext<'_>,
        message: &str,
    ) -> Result<(), LoggingError> {
        if !self.enabled(level) {
            return Ok(());
        }
        let record = LogRecord {
            ts: ts_ms,
            level: level.as_str(),
            module,
            client_id: context.client_id,
            clock: context.clock_s,
            message,
        };
        let line = serde_json::to_string(&record).map_err(LoggingError::Serialize)?;
        if let Some(mirror) = self.mirror.as_mut() {
            writeln!(mirror, "{line}").map_err(LoggingError::Mirror)?;
        }
        self.rotate_if_needed(line.len());
        self.active.bytes_written = self.active.bytes_written.saturating_add(line.len());
        self.active.lines.push(line);
        Ok(())
    }

    /// Rotated segments oldest first, then the active one.
    pub fn files(&self) -> impl Iterator<Item = &LogFile> {
        self.files.iter().chain(std::iter::once(&self.active))
    }

    /// Every retained line in write order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.files()
            .flat_map(|file| file.lines().iter().map(String::as_str))
    }

    fn rotate_if_needed(&mut self, next_line_len: usize) {
        if self.active.bytes_written + next_line_len <= self.policy.max_bytes {
            return;
        }
        if !self.active.lines.is_empty() {
            self.files.push_back(std::mem::take(&mut self.active));
            while self.files.len() > self.policy.max_files {
                self.files.pop_front();
            }
        }
        self.active = LogFile::default();
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write log mirror: {0}")]
    Mirror(#[source] std::io::Error),
}

#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    ts: i64,
    level: &'a str,
    module: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clock: Option<f64>,
    message: &'a str,
}
