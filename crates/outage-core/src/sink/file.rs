// # File Event Sink
//
// Append-only, line-per-event log file.
//
// ## Record Format
//
// ```text
// | Connectivity outage detected for: 10.0.0.1                                      | 2025-01-09T12:00:00_042   |
// ```
//
// The message is left aligned in an 80 column field and the timestamp in a
// 26 column field, so a log stays readable as a table.
//
// ## Durability
//
// Every record is followed by `sync_data()`. Any failure to write or sync
// is reported as `Error::Sink`, which the engine treats as fatal.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::event_sink::EventSink;

/// Name of the log file created inside the log directory
pub const LOG_FILE_NAME: &str = "bg-ping.log";

/// File-backed event sink
///
/// # Example
///
/// ```rust,no_run
/// use outage_core::sink::FileSink;
/// use outage_core::traits::EventSink;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sink = FileSink::create("/var/log").await?;
///     sink.record("Connectivity outage detected for: 10.0.0.1", "2025-01-09T12:00:00_042").await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) `bg-ping.log` inside `dir` for appending
    ///
    /// Creates `dir` if it does not exist yet.
    pub async fn create<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();

        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Self::open(dir.join(LOG_FILE_NAME)).await
    }

    /// Open (or create) the log file at an exact path for appending
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                Error::config(format!("Failed to create log {}: {}", path.display(), e))
            })?;

        tracing::debug!("Event log opened: {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render one record line
    pub fn format_record(message: &str, timestamp: &str) -> String {
        format!("| {:<80}| {:<26}|\n", message, timestamp)
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn record(&self, message: &str, timestamp: &str) -> Result<(), Error> {
        let line = Self::format_record(message, timestamp);

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            Error::sink(format!(
                "Failed to record event into {}: {}",
                self.path.display(),
                e
            ))
        })?;
        file.sync_data().await.map_err(|e| {
            Error::sink(format!("Failed to sync {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        let mut file = self.file.lock().await;
        file.flush()
            .await
            .map_err(|e| Error::sink(format!("Failed to flush {}: {}", self.path.display(), e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::sink(format!("Failed to sync {}: {}", self.path.display(), e)))
    }
}
