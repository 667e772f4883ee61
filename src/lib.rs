//! Event-time sessionization: folds an arrival-ordered stream of per-client
//! events into sessions closed after a fixed inactivity period.

pub mod app;
pub mod config;
pub mod engine;
pub mod event_model;
pub mod logging;
pub mod sink;
pub mod source;

pub use config::{ConfigError, SessionizerConfig};
pub use engine::{
    PipelineError, RunReport, SessionTracker, Sessionizer, TrackerError, TrackerTelemetry,
};
pub use event_model::{
    Event, ExpirationEntry, ExpirationSchedule, ScheduleError, Session, SessionTable, Timestamp,
    TimestampError,
};
pub use logging::{JsonLineLogger, LogContext, LogFile, LogLevel, LogRotationPolicy, LoggingError};
pub use sink::{format_session_line, CollectingSink, CsvSink, SessionSink, SinkError};
pub use source::{parse_edgar_record, CsvSource, EventSource, SourceError, VecSource};
