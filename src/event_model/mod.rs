//! Session data model: validated event time, session records and the two
//! containers the tracker drives on every event.

pub mod schedule;
pub mod session;
pub mod session_table;
pub mod timestamp;

pub use schedule::{ExpirationEntry, ExpirationSchedule, ScheduleError};
pub use session::{Event, Session};
pub use session_table::SessionTable;
pub use timestamp::{Timestamp, TimestampError};
