//! Session tracking core and the driver that feeds it.

pub mod pipeline;
pub mod tracker;

pub use pipeline::{PipelineError, RunReport, Sessionizer};
pub use tracker::{SessionTracker, TrackerError, TrackerTelemetry};
