// # Event Sink Trait
//
// Defines where outage transitions and operational faults are recorded.
//
// ## Implementations
//
// - `FileSink`: append-only log file (the daemon default)
// - `MemorySink`: in-process record list (tests, embedding)
//
// ## Failure Policy
//
// A sink that cannot persist a record returns `Error::Sink`. The sink never
// decides what happens next; the engine treats the error as fatal and stops
// all monitoring, and the daemon maps that to a non-zero exit.

use async_trait::async_trait;

/// Trait for event record persistence
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one record
    ///
    /// # Parameters
    ///
    /// - `message`: Human-readable event text
    /// - `timestamp`: Local time, `YYYY-MM-DDTHH:MM:SS_mmm`
    ///   (see [`crate::sink::timestamp`])
    async fn record(&self, message: &str, timestamp: &str) -> Result<(), crate::Error>;

    /// Flush buffered records
    ///
    /// Called once when monitoring stops.
    async fn flush(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
