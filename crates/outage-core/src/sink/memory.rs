// # Memory Event Sink
//
// Keeps records in process memory. Nothing survives a restart.
//
// ## When to Use
//
// - Testing environments
// - Embedding the engine where the host application owns persistence

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::event_sink::EventSink;

/// One stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub message: String,
    pub timestamp: String,
}

/// In-memory event sink
///
/// Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<RwLock<Vec<SinkRecord>>>,
}

impl MemorySink {
    /// Create a new empty memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All records so far, oldest first
    pub async fn records(&self) -> Vec<SinkRecord> {
        self.inner.read().await.clone()
    }

    /// Messages only, oldest first
    pub async fn messages(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .iter()
            .map(|record| record.message.clone())
            .collect()
    }

    /// Number of messages containing `needle`
    pub async fn count_containing(&self, needle: &str) -> usize {
        self.inner
            .read()
            .await
            .iter()
            .filter(|record| record.message.contains(needle))
            .count()
    }

    /// Get the number of records in the sink
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the sink is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn record(&self, message: &str, timestamp: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.push(SinkRecord {
            message: message.to_string(),
            timestamp: timestamp.to_string(),
        });
        Ok(())
    }
}
