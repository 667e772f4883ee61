use super::tracker::{SessionTracker, TrackerError, TrackerTelemetry};
use crate::config::SessionizerConfig;
use crate::event_model::Session;
use crate::logging::{JsonLineLogger, LogContext, LogLevel, LoggingError};
use crate::sink::{SessionSink, SinkError};
use crate::source::{EventSource, SourceError};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

const MODULE: &str = "sessionizer::pipeline";

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source failed: {0}")]
    Source(#[from] SourceError),
    #[error("tracker failed: {0}")]
    Tracker(#[from] TrackerError),
    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
}

/// Summary returned by a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub telemetry: TrackerTelemetry,
    pub records_skipped: u64,
    pub sessions_written: u64,
}

/// Drives events from a source through the tracker into a sink.
///
/// Expired sessions reach the sink as soon as the event that closed them is
/// ingested; the remainder are flushed in open order when the source runs
/// dry.
pub struct Sessionizer<S, K> {
    source: S,
    sink: K,
    tracker: SessionTracker,
    logger: JsonLineLogger,
    skip_malformed_records: bool,
    records_skipped: u64,
    sessions_written: u64,
}

impl<S: EventSource, K: SessionSink> Sessionizer<S, K> {
    pub fn new(source: S, sink: K, config: &SessionizerConfig) -> Result<Self, PipelineError> {
        let tracker = SessionTracker::new(config.inactivity_period_s)?;
        let mut logger = JsonLineLogger::new(config.log_rotation);
        logger.set_level(config.log_level);
        Ok(Self {
            source,
            sink,
            tracker,
            logger,
            skip_malformed_records: config.skip_malformed_records,
            records_skipped: 0,
            sessions_written: 0,
        })
    }

    /// Logger used by the run. Lines logged before a failed run stay here.
    pub fn logger(&self) -> &JsonLineLogger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut JsonLineLogger {
        &mut self.logger
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_parts(self) -> (K, JsonLineLogger) {
        (self.sink, self.logger)
    }

    /// Consumes the source to the end and flushes the remaining sessions. A
    /// failure is logged at ERROR before it is returned.
    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        let result = self.drive();
        if let Err(err) = &result {
            let message = format!("sessionization aborted: {err}");
            self.log(
                LogLevel::Error,
                LogContext::default().with_clock(self.clock_s()),
                &message,
            )?;
        }
        result
    }

    fn drive(&mut self) -> Result<RunReport, PipelineError> {
        self.log(
            LogLevel::Info,
            LogContext::default(),
            &format!(
                "sessionization started, inactivity period {}s",
                self.tracker.timeout_s()
            ),
        )?;

        while self.source.has_next() {
            let event = match self.source.next_event() {
                Ok(event) => event,
                Err(err) if self.skip_malformed_records && err.is_malformed_record() => {
                    self.records_skipped += 1;
                    self.log(
                        LogLevel::Warn,
                        LogContext::default().with_clock(self.clock_s()),
                        &format!("skipping record: {err}"),
                    )?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let expired = self.tracker.ingest(&event)?;
            self.emit(&expired, "session expired")?;
        }

        let remaining = self.tracker.finalize();
        self.log(
            LogLevel::Info,
            LogContext::default().with_clock(self.clock_s()),
            &format!("end of stream, flushing {} open sessions", remaining.len()),
        )?;
        self.emit(&remaining, "session flushed")?;
        self.sink.finish()?;

        let report = RunReport {
            telemetry: self.tracker.telemetry(),
            records_skipped: self.records_skipped,
            sessions_written: self.sessions_written,
        };
        self.log(
            LogLevel::Info,
            LogContext::default().with_clock(self.clock_s()),
            &format!(
                "sessionization finished: {} events, {} sessions written, {} records skipped",
                report.telemetry.events_ingested, report.sessions_written, report.records_skipped
            ),
        )?;
        Ok(report)
    }

    fn emit(&mut self, sessions: &[Session], message: &str) -> Result<(), PipelineError> {
        for session in sessions {
            self.sink.accept(session)?;
            self.sessions_written += 1;
            if self.logger.enabled(LogLevel::Debug) {
                self.log(
                    LogLevel::Debug,
                    LogContext::client(&session.client_id).with_clock(self.clock_s()),
                    message,
                )?;
            }
        }
        Ok(())
    }

    fn clock_s(&self) -> Option<f64> {
        self.tracker.clock().map(|clock| clock.as_secs())
    }

    fn log(
        &mut self,
        level: LogLevel,
        context: LogContext<'_>,
        message: &str,
    ) -> Result<(), PipelineError> {
        self.logger
            .log(Utc::now().timestamp_millis(), level, MODULE, context, message)?;
        Ok(())
    }
}
