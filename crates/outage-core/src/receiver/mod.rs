//! Receiver / demultiplexer
//!
//! The single reader of the shared transport. Every inbound ICMP message
//! is parsed and, when it is an echo reply owned by a registered probe,
//! handed to that probe's channel.
//!
//! ```text
//! Transport::receive ──▶ parse_echo_reply ──▶ ProbeRegistry::route ──▶ Probe
//!        │ error              │ error / not a reply    │ unknown id
//!        ▼                    ▼                        ▼
//!   record, continue     record / discard          discard
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::engine::{MonitorEvent, Recorder};
use crate::error::{Error, Result};
use crate::packet::parse_echo_reply;
use crate::registry::{ProbeRegistry, RouteOutcome};
use crate::traits::Transport;

/// Routes inbound echo replies to their probes
pub struct Receiver {
    transport: Arc<dyn Transport>,
    registry: Arc<ProbeRegistry>,
    recorder: Recorder,
}

impl Receiver {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ProbeRegistry>,
        recorder: Recorder,
    ) -> Self {
        Self {
            transport,
            registry,
            recorder,
        }
    }

    /// Drain the transport until `shutdown` is cancelled
    ///
    /// Read and parse failures are recorded and never end the loop.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Shutdown requested
    /// - `Err(Error::Sink)`: A failure could not be recorded. Fatal.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        debug!("Receiver started for {} probe(s)", self.registry.len());

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.transport.receive() => received,
            };

            match received {
                Ok((bytes, source)) => self.dispatch(&bytes, source).await?,
                // Framing the transport could not unwrap, e.g. a bad IPv4 header
                Err(Error::Parse(error)) => {
                    self.recorder
                        .record(MonitorEvent::ParseFailed { error })
                        .await?;
                }
                Err(e) => {
                    self.recorder
                        .record(MonitorEvent::ReceiveFailed {
                            error: e.to_string(),
                        })
                        .await?;
                }
            }
        }

        debug!("Receiver stopped");
        Ok(())
    }

    /// Parse one message and route it
    async fn dispatch(&self, bytes: &[u8], source: std::net::Ipv4Addr) -> Result<()> {
        let reply = match parse_echo_reply(bytes) {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                trace!("Discarding non echo-reply ICMP message from {}", source);
                return Ok(());
            }
            Err(e) => {
                let error = match e {
                    Error::Parse(msg) => msg,
                    other => other.to_string(),
                };
                return self
                    .recorder
                    .record(MonitorEvent::ParseFailed { error })
                    .await;
            }
        };

        match self.registry.route(reply, source) {
            RouteOutcome::Delivered => {
                trace!(
                    "Routed reply id {} seq {} from {}",
                    reply.identifier, reply.sequence, source
                );
            }
            RouteOutcome::UnknownIdentifier => {
                trace!("Discarding reply with unknown id {} from {}", reply.identifier, source);
            }
            RouteOutcome::SourceMismatch => {
                debug!(
                    "Discarding reply id {} from {}: probe targets {:?}",
                    reply.identifier,
                    source,
                    self.registry.target_of(reply.identifier)
                );
            }
            RouteOutcome::Full => {
                warn!(
                    "Probe {} reply buffer full, dropping reply seq {}",
                    reply.identifier, reply.sequence
                );
            }
            RouteOutcome::Closed => {
                debug!("Probe {} has stopped, dropping reply", reply.identifier);
            }
        }

        Ok(())
    }
}
