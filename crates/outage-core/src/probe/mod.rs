//! Per-target probe and its outage state machine
//!
//! ## State Machine
//!
//! ```text
//!              timeout (emit "outage detected")
//!   ┌─────────┐ ─────────────────────────────▶ ┌─────────┐
//!   │ Healthy │                                │ Outage  │ ◀─┐ timeout
//!   └─────────┘ ◀───────────────────────────── └─────────┘ ──┘ (silent)
//!     │    ▲     matching reply (emit "outage cleared")
//!     └────┘
//!   matching reply (silent)
//! ```
//!
//! ## Iteration
//!
//! 1. Send an echo request carrying the current sequence
//! 2. Wait up to [`REPLY_TIMEOUT`] for a matching reply
//! 3. Reply: advance the sequence, sleep [`PROBE_INTERVAL`]
//! 4. Timeout: keep the sequence and resend at once, so a reply that is
//!    merely late can still resolve the next wait

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::MatchPolicy;
use crate::engine::{MonitorEvent, Recorder};
use crate::error::Result;
use crate::packet::{EchoReply, EchoRequest};
use crate::traits::Transport;

/// How long a probe waits for a matching reply
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(1900);

/// Pause between a resolved request and the next one
pub const PROBE_INTERVAL: Duration = Duration::from_millis(900);

/// Sequence carried by a probe's first request
pub const FIRST_SEQUENCE: u16 = 1;

/// Liveness state of one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbeState {
    #[default]
    Healthy,
    Outage,
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A reply arrived before the deadline
    Reply(EchoReply),
    /// The deadline passed first
    Timeout,
}

/// An edge in the state machine; the only thing that produces an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    OutageDetected,
    OutageCleared,
}

/// One monitored target
///
/// Owns its identifier, sequence counter, outage state and the receiving
/// end of its inbound reply channel. Nothing else mutates these.
#[derive(Debug)]
pub struct Probe {
    identifier: u16,
    target: Ipv4Addr,
    sequence: u16,
    state: ProbeState,
    match_policy: MatchPolicy,
    inbound: mpsc::Receiver<EchoReply>,
}

impl Probe {
    /// Create a healthy probe whose first request carries [`FIRST_SEQUENCE`]
    pub fn new(identifier: u16, target: Ipv4Addr, inbound: mpsc::Receiver<EchoReply>) -> Self {
        Self {
            identifier,
            target,
            sequence: FIRST_SEQUENCE,
            state: ProbeState::Healthy,
            match_policy: MatchPolicy::default(),
            inbound,
        }
    }

    /// Set the reply match policy
    pub fn with_match_policy(mut self, match_policy: MatchPolicy) -> Self {
        self.match_policy = match_policy;
        self
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    /// Sequence of the outstanding (or next) request
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Replies buffered but not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.inbound.len()
    }

    /// The request for the current iteration
    pub fn request(&self) -> EchoRequest {
        EchoRequest::new(self.identifier, self.sequence)
    }

    /// Whether `reply` resolves the outstanding request
    pub fn matches(&self, reply: &EchoReply) -> bool {
        match self.match_policy {
            MatchPolicy::IdentifierAndSequence => {
                reply.identifier == self.identifier && reply.sequence == self.sequence
            }
            MatchPolicy::IdentifierOnly => reply.identifier == self.identifier,
        }
    }

    /// Apply the outcome of one wait
    ///
    /// A matching reply advances the sequence; a timeout never does. A reply
    /// that does not match changes nothing.
    ///
    /// # Returns
    ///
    /// The transition to report, if the state changed.
    pub fn resolve(&mut self, outcome: Outcome) -> Option<Transition> {
        match outcome {
            Outcome::Reply(reply) => {
                if !self.matches(&reply) {
                    return None;
                }
                self.sequence = self.sequence.wrapping_add(1);
                match self.state {
                    ProbeState::Outage => {
                        self.state = ProbeState::Healthy;
                        Some(Transition::OutageCleared)
                    }
                    ProbeState::Healthy => None,
                }
            }
            Outcome::Timeout => match self.state {
                ProbeState::Healthy => {
                    self.state = ProbeState::Outage;
                    Some(Transition::OutageDetected)
                }
                ProbeState::Outage => None,
            },
        }
    }

    /// Wait up to [`REPLY_TIMEOUT`] for a matching reply
    ///
    /// Replies that do not match (stale sequences, duplicates) are discarded
    /// without extending the deadline.
    pub async fn await_reply(&mut self) -> Outcome {
        let deadline = Instant::now() + REPLY_TIMEOUT;

        loop {
            match timeout_at(deadline, self.inbound.recv()).await {
                Ok(Some(reply)) if self.matches(&reply) => return Outcome::Reply(reply),
                Ok(Some(reply)) => {
                    trace!(
                        "Probe {} discarding reply seq {} (outstanding seq {})",
                        self.identifier, reply.sequence, self.sequence
                    );
                }
                Ok(None) => {
                    // Registry gone; nothing can arrive, but keep the cadence.
                    sleep_until(deadline).await;
                    return Outcome::Timeout;
                }
                Err(_) => return Outcome::Timeout,
            }
        }
    }

    /// Probe until `shutdown` is cancelled
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Shutdown requested
    /// - `Err(Error::Sink)`: An event could not be recorded. Fatal.
    pub async fn run(
        mut self,
        transport: Arc<dyn Transport>,
        recorder: Recorder,
        shutdown: CancellationToken,
    ) -> Result<()> {
        debug!("Probe {} started for {}", self.identifier, self.target);

        loop {
            let request = self.request();
            let sent = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = transport.send(self.target, &request) => sent,
            };

            if let Err(e) = sent {
                recorder
                    .record(MonitorEvent::SendFailed {
                        target: self.target,
                        error: e.to_string(),
                    })
                    .await?;
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                outcome = self.await_reply() => outcome,
            };

            let resolved = matches!(outcome, Outcome::Reply(_));
            if let Some(transition) = self.resolve(outcome) {
                recorder.record(self.event_for(transition)).await?;
            }

            if resolved {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = sleep(PROBE_INTERVAL) => {}
                }
            }
        }

        debug!("Probe {} for {} stopped", self.identifier, self.target);
        Ok(())
    }

    fn event_for(&self, transition: Transition) -> MonitorEvent {
        match transition {
            Transition::OutageDetected => MonitorEvent::OutageDetected {
                target: self.target,
                identifier: self.identifier,
            },
            Transition::OutageCleared => MonitorEvent::OutageCleared {
                target: self.target,
                identifier: self.identifier,
            },
        }
    }
}
