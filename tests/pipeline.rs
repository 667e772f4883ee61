use serde_json::Value;
use sessionizer::{
    CollectingSink, CsvSource, Event, EventSource, JsonLineLogger, LogLevel, PipelineError,
    RunReport, Session, SessionSink, SessionizerConfig, Sessionizer, SinkError, SourceError,
    VecSource,
};
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

fn run_to_end<S: EventSource, K: SessionSink>(
    source: S,
    sink: K,
    config: &SessionizerConfig,
) -> (RunReport, K, JsonLineLogger) {
    let mut sessionizer = Sessionizer::new(source, sink, config).unwrap();
    let report = sessionizer.run().unwrap();
    let (sink, logger) = sessionizer.into_parts();
    (report, sink, logger)
}

fn run_to_failure<S: EventSource, K: SessionSink>(
    source: S,
    sink: K,
    config: &SessionizerConfig,
) -> (PipelineError, JsonLineLogger) {
    let mut sessionizer = Sessionizer::new(source, sink, config).unwrap();
    let err = sessionizer.run().unwrap_err();
    let (_, logger) = sessionizer.into_parts();
    (err, logger)
}

fn parsed(logger: &JsonLineLogger) -> Vec<Value> {
    logger
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap())
        .collect()
}

fn events(raw: &[(&str, f64)]) -> VecSource {
    VecSource::new(raw.iter().map(|(client, at)| Event::new(*client, *at)))
}

fn clients(sessions: &[Session]) -> Vec<(&str, f64, f64)> {
    sessions
        .iter()
        .map(|session| {
            (
                session.client_id.as_str(),
                session.start_time.as_secs(),
                session.last_activity_time.as_secs(),
            )
        })
        .collect()
}

#[test]
fn expired_sessions_reach_sink_before_flushed_ones() {
    let source = events(&[("a", 0.0), ("b", 0.0), ("b", 1.0), ("c", 1.0), ("a", 2.0), ("b", 4.0)]);
    let config = SessionizerConfig::new(2.0);
    let (report, sink, _logger) = run_to_end(source, CollectingSink::new(), &config);

    assert_eq!(
        clients(sink.sessions()),
        vec![
            ("a", 0.0, 0.0),
            ("b", 0.0, 1.0),
            ("c", 1.0, 1.0),
            ("a", 2.0, 2.0),
            ("b", 4.0, 4.0),
        ]
    );
    assert!(sink.is_finished());
    assert_eq!(report.sessions_written, 5);
    assert_eq!(report.records_skipped, 0);
    assert_eq!(report.telemetry.events_ingested, 6);
    assert_eq!(report.telemetry.sessions_expired, 4);
    assert_eq!(report.telemetry.sessions_flushed, 1);
}

#[test]
fn empty_source_writes_nothing() {
    let config = SessionizerConfig::new(5.0);
    let (report, sink, _) = run_to_end(VecSource::default(), CollectingSink::new(), &config);
    assert!(sink.sessions().is_empty());
    assert!(sink.is_finished());
    assert_eq!(report.sessions_written, 0);
    assert_eq!(report.telemetry.clock_s, None);
}

#[test]
fn rejects_invalid_inactivity_period() {
    let config = SessionizerConfig::new(0.0);
    let result = Sessionizer::new(VecSource::default(), CollectingSink::new(), &config);
    assert!(matches!(result, Err(PipelineError::Tracker(_))));
}

#[test]
fn invalid_timestamp_aborts_run() {
    let source = events(&[("a", 1.0), ("b", -1.0), ("c", 2.0)]);
    let config = SessionizerConfig::new(2.0);
    let (err, _) = run_to_failure(source, CollectingSink::new(), &config);
    assert!(matches!(err, PipelineError::Tracker(_)));
}

struct RejectingSink {
    accepted: usize,
    reject_after: usize,
}

impl SessionSink for RejectingSink {
    fn accept(&mut self, session: &Session) -> Result<(), SinkError> {
        if self.accepted == self.reject_after {
            return Err(SinkError::Rejected {
                client_id: session.client_id.clone(),
                reason: "downstream unavailable".to_string(),
            });
        }
        self.accepted += 1;
        Ok(())
    }
}

#[test]
fn sink_failure_aborts_run() {
    let source = events(&[("a", 0.0), ("b", 10.0), ("c", 20.0)]);
    let sink = RejectingSink {
        accepted: 0,
        reject_after: 1,
    };
    let (err, _) = run_to_failure(source, sink, &SessionizerConfig::new(1.0));
    match err {
        PipelineError::Sink(SinkError::Rejected { client_id, .. }) => assert_eq!(client_id, "b"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn failed_run_keeps_its_log_history() {
    let mut config = SessionizerConfig::new(2.0);
    config.skip_malformed_records = true;
    let sink = RejectingSink {
        accepted: 0,
        reject_after: 0,
    };
    let (err, logger) = run_to_failure(csv_with_bad_line(), sink, &config);
    assert!(matches!(err, PipelineError::Sink(_)));

    let records = parsed(&logger);
    let levels: Vec<_> = records
        .iter()
        .map(|record| record["level"].as_str().unwrap())
        .collect();
    assert_eq!(levels, vec!["INFO", "WARN", "INFO", "ERROR"]);
    assert!(records[1]["message"].as_str().unwrap().contains("line 3"));
    assert!(records[3]["message"]
        .as_str()
        .unwrap()
        .contains("downstream unavailable"));
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn mirror_receives_lines_as_they_are_logged() {
    let source = events(&[("a", 0.0), ("b", 10.0)]);
    let sink = RejectingSink {
        accepted: 0,
        reject_after: 0,
    };
    let mirror = SharedBuffer::default();
    let mut sessionizer =
        Sessionizer::new(source, sink, &SessionizerConfig::new(1.0)).unwrap();
    sessionizer.logger_mut().mirror_to(mirror.clone());
    assert!(sessionizer.run().is_err());

    let streamed = String::from_utf8(mirror.0.lock().unwrap().clone()).unwrap();
    let kept: Vec<_> = sessionizer.logger().lines().collect();
    assert_eq!(streamed.lines().collect::<Vec<_>>(), kept);
    assert_eq!(kept.len(), 2);
}

fn csv_with_bad_line() -> CsvSource<Cursor<String>> {
    let payload = "ip,date,time,zone,cik,accession,extention\n\
                   a,2017-06-30,00:00:00,0.0,1,2,3\n\
                   garbage\n\
                   a,2017-06-30,00:00:01,0.0,1,2,3\n";
    CsvSource::new(Cursor::new(payload.to_string())).unwrap()
}

#[test]
fn malformed_record_aborts_by_default() {
    let config = SessionizerConfig::new(2.0);
    let (err, _) = run_to_failure(csv_with_bad_line(), CollectingSink::new(), &config);
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::MissingField { line: 3, .. })
    ));
}

#[test]
fn malformed_record_skipped_when_configured() {
    let mut config = SessionizerConfig::new(2.0);
    config.skip_malformed_records = true;
    let (report, sink, logger) = run_to_end(csv_with_bad_line(), CollectingSink::new(), &config);
    assert_eq!(report.records_skipped, 1);
    assert_eq!(sink.sessions().len(), 1);
    assert_eq!(sink.sessions()[0].request_count, 2);

    let warnings: Vec<Value> = parsed(&logger)
        .into_iter()
        .filter(|record| record["level"] == "WARN")
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0]["message"]
        .as_str()
        .unwrap()
        .contains("line 3"));
}

#[test]
fn debug_level_logs_each_emitted_session() {
    let mut config = SessionizerConfig::new(1.0);
    config.log_level = LogLevel::Debug;
    let source = events(&[("a", 0.0), ("b", 5.0)]);
    let (_, _, logger) = run_to_end(source, CollectingSink::new(), &config);
    let records = parsed(&logger);
    let debug: Vec<_> = records
        .iter()
        .filter(|record| record["level"] == "DEBUG")
        .collect();
    assert_eq!(debug.len(), 2);
    assert_eq!(debug[0]["client_id"], "a");
    assert_eq!(debug[0]["message"], "session expired");
    assert_eq!(debug[0]["clock"], 5.0);
    assert_eq!(debug[1]["client_id"], "b");
    assert_eq!(debug[1]["message"], "session flushed");
    assert!(records
        .iter()
        .all(|record| record["module"] == "sessionizer::pipeline"));
}

#[test]
fn info_level_omits_per_session_records() {
    let config = SessionizerConfig::new(1.0);
    let source = events(&[("a", 0.0), ("b", 5.0)]);
    let (_, _, logger) = run_to_end(source, CollectingSink::new(), &config);
    let levels: Vec<String> = parsed(&logger)
        .iter()
        .map(|record| record["level"].to_string())
        .collect();
    assert_eq!(levels.len(), 3);
    assert!(levels.iter().all(|level| level == "\"INFO\""));
}

#[test]
fn badly_encoded_record_is_skipped_when_configured() {
    let mut payload = b"ip,date,time,zone,cik,accession,extention\n\
a,2017-06-30,00:00:00,0.0,1,2,3\n"
        .to_vec();
    payload.extend_from_slice(b"b\xff\xfe,2017-06-30,00:00:01,0.0,1,2,3\n");
    payload.extend_from_slice(b"a,2017-06-30,00:00:01,0.0,1,2,3\n");
    let mut config = SessionizerConfig::new(2.0);
    config.skip_malformed_records = true;

    let source = CsvSource::new(Cursor::new(payload.clone())).unwrap();
    let (report, sink, logger) = run_to_end(source, CollectingSink::new(), &config);
    assert_eq!(report.records_skipped, 1);
    assert_eq!(sink.sessions().len(), 1);
    assert_eq!(sink.sessions()[0].client_id, "a");
    assert_eq!(sink.sessions()[0].request_count, 2);
    assert!(parsed(&logger)
        .iter()
        .any(|record| record["level"] == "WARN"
            && record["message"].as_str().unwrap().contains("line 3")));

    config.skip_malformed_records = false;
    let source = CsvSource::new(Cursor::new(payload)).unwrap();
    let (err, _) = run_to_failure(source, CollectingSink::new(), &config);
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::InvalidEncoding { line: 3 })
    ));
}
