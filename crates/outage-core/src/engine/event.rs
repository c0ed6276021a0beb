//! Monitor events and the recorder that publishes them
//!
//! Every event takes two paths:
//!
//! 1. Rendered to text and appended to the [`EventSink`] (must succeed)
//! 2. Offered to the typed event channel (best effort, dropped when full)

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, trace, warn};

use crate::error::{Error, Result};
use crate::sink::timestamp;
use crate::traits::EventSink;

/// Events emitted by the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Receiver and probes are about to start
    Started { probes: usize },

    /// A healthy target stopped answering
    OutageDetected { target: Ipv4Addr, identifier: u16 },

    /// A target in outage answered again
    OutageCleared { target: Ipv4Addr, identifier: u16 },

    /// An echo request could not be sent
    SendFailed { target: Ipv4Addr, error: String },

    /// The shared socket failed a read
    ReceiveFailed { error: String },

    /// An inbound packet was not valid ICMP
    ParseFailed { error: String },

    /// A termination signal was caught
    SignalCaught { signal: String },

    /// Monitoring stopped
    Stopped { reason: String },
}

impl MonitorEvent {
    /// Whether this event reports a fault or outage
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Self::OutageDetected { .. }
                | Self::SendFailed { .. }
                | Self::ReceiveFailed { .. }
                | Self::ParseFailed { .. }
        )
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { probes } => {
                write!(f, "Starting receiver and {} probe(s)", probes)
            }
            Self::OutageDetected { target, .. } => {
                write!(f, "Connectivity outage detected for: {}", target)
            }
            Self::OutageCleared { target, .. } => {
                write!(f, "Connectivity outage cleared for: {}", target)
            }
            Self::SendFailed { target, error } => {
                write!(f, "Failed to send a packet to: {}: {}", target, error)
            }
            Self::ReceiveFailed { error } => write!(f, "Failed to read icmp packet: {}", error),
            Self::ParseFailed { error } => write!(f, "Failed to parse icmp packet: {}", error),
            Self::SignalCaught { signal } => {
                write!(f, "Captured {}, closing log and terminating", signal)
            }
            Self::Stopped { reason } => write!(f, "Monitoring stopped: {}", reason),
        }
    }
}

/// Publishes events to the sink and the typed event channel
///
/// Cheap to clone; every task holds its own copy.
#[derive(Clone)]
pub struct Recorder {
    sink: Arc<dyn EventSink>,
    events: mpsc::Sender<MonitorEvent>,
}

impl Recorder {
    /// Create a recorder and the receiving end of its event channel
    pub fn new(
        sink: Arc<dyn EventSink>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (events, rx) = mpsc::channel(capacity.max(1));
        (Self { sink, events }, rx)
    }

    /// Record an event
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The sink persisted the record
    /// - `Err(Error::Sink)`: The sink failed. Callers must stop.
    pub async fn record(&self, event: MonitorEvent) -> Result<()> {
        let message = event.to_string();

        if event.is_alert() {
            warn!("{}", message);
        } else {
            info!("{}", message);
        }

        self.sink
            .record(&message, &timestamp())
            .await
            .map_err(|e| match e {
                Error::Sink(_) => e,
                other => Error::sink(other.to_string()),
            })?;

        self.emit(event);
        Ok(())
    }

    /// Flush the underlying sink
    pub async fn flush(&self) -> Result<()> {
        self.sink.flush().await
    }

    fn emit(&self, event: MonitorEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    "Event channel full, dropping event: {}. Consider increasing event_channel_capacity.",
                    event
                );
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Event channel closed, event only written to sink");
            }
        }
    }
}
