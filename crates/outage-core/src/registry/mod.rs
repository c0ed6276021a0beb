//! Probe registry
//!
//! Maps an echo identifier to the inbound channel of the probe that owns it.
//! The registry is built once, before any task starts, and is never mutated
//! afterwards; the receiver reads it through an `Arc` without locking.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outage_core::registry::ProbeRegistry;
//!
//! let (registry, probes) = ProbeRegistry::build(&config)?;
//!
//! // Receiver side
//! match registry.route(reply, source) {
//!     RouteOutcome::Delivered => {}
//!     RouteOutcome::UnknownIdentifier => { /* foreign traffic */ }
//!     _ => { /* dropped */ }
//! }
//! ```
//!
//! ## Handoff
//!
//! Delivery uses `try_send` on a bounded per-probe channel. A probe that is
//! slow to drain its channel loses replies once the buffer is full, but it
//! can never stall delivery to other probes.

use crate::config::{IdentifierStrategy, MonitorConfig};
use crate::error::{Error, Result};
use crate::packet::EchoReply;
use crate::probe::Probe;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of routing one reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the owning probe
    Delivered,
    /// No probe owns this identifier
    UnknownIdentifier,
    /// The identifier is known but the reply came from another host
    SourceMismatch,
    /// The owning probe's buffer is full; reply dropped
    Full,
    /// The owning probe has stopped; reply dropped
    Closed,
}

/// One registry entry
#[derive(Debug)]
struct Route {
    target: Ipv4Addr,
    inbound: mpsc::Sender<EchoReply>,
}

/// Identifier → probe inbound channel
#[derive(Debug)]
pub struct ProbeRegistry {
    routes: HashMap<u16, Route>,
    verify_source: bool,
}

impl ProbeRegistry {
    /// Assign identifiers and build one probe per configured target
    ///
    /// # Returns
    ///
    /// A tuple of (registry, probes). Probes are returned in target order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration does not validate.
    pub fn build(config: &MonitorConfig) -> Result<(Self, Vec<Probe>)> {
        config.validate()?;

        let identifiers = assign_identifiers(config.targets.len(), config.identifiers)?;

        let mut routes = HashMap::with_capacity(config.targets.len());
        let mut probes = Vec::with_capacity(config.targets.len());

        for (&target, identifier) in config.targets.iter().zip(identifiers) {
            let (tx, rx) = mpsc::channel(config.reply_channel_capacity);
            routes.insert(
                identifier,
                Route {
                    target,
                    inbound: tx,
                },
            );
            probes.push(Probe::new(identifier, target, rx).with_match_policy(config.match_policy));
        }

        Ok((
            Self {
                routes,
                verify_source: config.verify_source,
            },
            probes,
        ))
    }

    /// Route a reply to the probe registered under its identifier
    ///
    /// Never blocks.
    pub fn route(&self, reply: EchoReply, source: Ipv4Addr) -> RouteOutcome {
        let Some(route) = self.routes.get(&reply.identifier) else {
            return RouteOutcome::UnknownIdentifier;
        };

        if self.verify_source && route.target != source {
            return RouteOutcome::SourceMismatch;
        }

        match route.inbound.try_send(reply) {
            Ok(()) => RouteOutcome::Delivered,
            Err(TrySendError::Full(_)) => RouteOutcome::Full,
            Err(TrySendError::Closed(_)) => RouteOutcome::Closed,
        }
    }

    /// Target registered under an identifier
    pub fn target_of(&self, identifier: u16) -> Option<Ipv4Addr> {
        self.routes.get(&identifier).map(|route| route.target)
    }

    /// All registered identifiers, ascending
    pub fn identifiers(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.routes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get the number of registered probes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Pick `count` distinct identifiers in `[0, 65535)`
fn assign_identifiers(count: usize, strategy: IdentifierStrategy) -> Result<Vec<u16>> {
    if count >= usize::from(u16::MAX) {
        return Err(Error::config(format!(
            "Cannot assign {} distinct identifiers",
            count
        )));
    }

    match strategy {
        IdentifierStrategy::Sequential => Ok((1..=count as u16).collect()),
        IdentifierStrategy::Random => {
            let mut rng = rand::thread_rng();
            let mut seen = HashSet::with_capacity(count);
            let mut identifiers = Vec::with_capacity(count);
            while identifiers.len() < count {
                let candidate = rng.gen_range(0..u16::MAX);
                if seen.insert(candidate) {
                    identifiers.push(candidate);
                }
            }
            Ok(identifiers)
        }
    }
}
