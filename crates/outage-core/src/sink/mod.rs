// # Event Sink Implementations
//
// This module provides implementations of the EventSink trait for
// different backing stores, plus the timestamp format every record uses.

pub mod file;
pub mod memory;

pub use file::{FileSink, LOG_FILE_NAME};
pub use memory::{MemorySink, SinkRecord};

/// Timestamp format: local time with millisecond resolution
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S_%3f";

/// Current local time formatted for an event record
///
/// e.g. `2025-01-09T12:00:00_042`
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_has_millisecond_suffix() {
        let at = chrono::Local
            .with_ymd_and_hms(2025, 1, 9, 7, 5, 3)
            .unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(
            at.format(TIMESTAMP_FORMAT).to_string(),
            "2025-01-09T07:05:03_042"
        );
    }

    #[test]
    fn current_timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), "YYYY-MM-DDTHH:MM:SS_mmm".len());
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], "_");
    }
}
