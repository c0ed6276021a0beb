//! Monitor engine
//!
//! The MonitorEngine is responsible for:
//! - Assigning identifiers and building one probe per target
//! - Running the shared receiver alongside every probe
//! - Stopping all tasks on shutdown or on the first fatal error
//! - Flushing the event sink before returning
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────┐
//!                       │  Transport   │ (one shared socket)
//!                       └──────────────┘
//!                        ▲            │
//!            send(request)            │ receive()
//!                        │            ▼
//! ┌─────────┐     ┌─────────┐   ┌──────────────┐
//! │ Probe 1 │ ... │ Probe N │   │   Receiver   │
//! └─────────┘     └─────────┘   └──────────────┘
//!      ▲               ▲              │
//!      │  inbound      │  inbound     │ ProbeRegistry::route
//!      └───────────────┴──────────────┘
//!      │
//!      ▼
//! ┌──────────────┐        ┌─────────────┐
//! │   Recorder   │──────▶ │  EventSink  │
//! └──────────────┘        └─────────────┘
//!      │
//!      ▼
//!  MonitorEvent channel (best effort)
//! ```
//!
//! ## Lifecycle
//!
//! 1. Record `Started`
//! 2. Spawn the receiver and every probe
//! 3. Wait for shutdown or the first task to fail
//! 4. Cancel the rest and wait for them to finish
//! 5. Record `Stopped` and flush the sink (clean shutdown only)

pub mod event;

pub use event::{MonitorEvent, Recorder};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::receiver::Receiver;
use crate::registry::ProbeRegistry;
use crate::traits::{EventSink, Transport};

/// Core monitor engine
///
/// ## Lifecycle
///
/// 1. Create with [`MonitorEngine::new()`]
/// 2. Start with [`MonitorEngine::run()`]
/// 3. Cancel the token passed to `run` to stop
///
/// ## Failure Policy
///
/// Send, receive and parse failures are recorded and monitoring continues.
/// A sink failure is fatal: every task is stopped and `run` returns it.
pub struct MonitorEngine {
    transport: Arc<dyn Transport>,
    registry: Arc<ProbeRegistry>,
    probes: Vec<Probe>,
    recorder: Recorder,
}

impl MonitorEngine {
    /// Create a new monitor engine
    ///
    /// # Parameters
    ///
    /// - `transport`: Shared ICMP transport
    /// - `sink`: Event sink every event is recorded to
    /// - `config`: Monitor configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields monitor events
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Result<(Self, mpsc::Receiver<MonitorEvent>)> {
        let (registry, probes) = ProbeRegistry::build(&config)?;
        let (recorder, rx) = Recorder::new(sink, config.event_channel_capacity);

        let engine = Self {
            transport,
            registry: Arc::new(registry),
            probes,
            recorder,
        };

        Ok((engine, rx))
    }

    /// Identifiers assigned to the probes, ascending
    pub fn identifiers(&self) -> Vec<u16> {
        self.registry.identifiers()
    }

    /// A handle for recording events outside the engine (e.g. signals)
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Run until `shutdown` is cancelled or a task fails fatally
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown, sink flushed
    /// - `Err(Error)`: Fatal error from the first failing task
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.recorder
            .record(MonitorEvent::Started {
                probes: self.probes.len(),
            })
            .await?;

        // Cancelling `stop` never cancels the caller's token.
        let stop = shutdown.child_token();
        let mut tasks = JoinSet::new();

        let receiver = Receiver::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.registry),
            self.recorder.clone(),
        );
        tasks.spawn(receiver.run(stop.clone()));

        for probe in self.probes {
            tasks.spawn(probe.run(
                Arc::clone(&self.transport),
                self.recorder.clone(),
                stop.clone(),
            ));
        }

        let mut failure: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| Error::task(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                if failure.is_none() {
                    error!("Monitoring task failed, stopping all tasks: {}", e);
                    stop.cancel();
                    failure = Some(e);
                } else {
                    debug!("Additional task failure during stop: {}", e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        self.recorder
            .record(MonitorEvent::Stopped {
                reason: "shutdown requested".to_string(),
            })
            .await?;
        self.recorder.flush().await?;
        info!("Event sink flushed, engine stopped");

        Ok(())
    }
}
