//! Configuration types for the outage prober
//!
//! Probe timing is deliberately absent: the reply timeout and the
//! inter-probe interval are constants in [`crate::probe`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Hosts to probe, one probe per entry
    pub targets: Vec<Ipv4Addr>,

    /// How echo identifiers are assigned to probes
    #[serde(default)]
    pub identifiers: IdentifierStrategy,

    /// Which fields of a reply must agree with the outstanding request
    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Drop replies whose source address differs from the probe's target
    #[serde(default)]
    pub verify_source: bool,

    /// Capacity of each probe's inbound reply buffer
    ///
    /// The receiver never blocks on a probe: when the buffer is full the
    /// reply is dropped (with a warning log).
    #[serde(default = "default_reply_channel_capacity")]
    pub reply_channel_capacity: usize,

    /// Capacity of the typed event channel returned by the engine
    ///
    /// When full, new events will be dropped (with a warning log). The
    /// event sink is unaffected.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl MonitorConfig {
    /// Create a configuration for the given targets with defaults
    pub fn new(targets: Vec<Ipv4Addr>) -> Self {
        Self {
            targets,
            identifiers: IdentifierStrategy::default(),
            match_policy: MatchPolicy::default(),
            verify_source: false,
            reply_channel_capacity: default_reply_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the identifier assignment strategy
    pub fn with_identifiers(mut self, identifiers: IdentifierStrategy) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Set the reply match policy
    pub fn with_match_policy(mut self, match_policy: MatchPolicy) -> Self {
        self.match_policy = match_policy;
        self
    }

    /// Enable or disable source address verification
    pub fn with_verify_source(mut self, verify_source: bool) -> Self {
        self.verify_source = verify_source;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.targets.is_empty() {
            return Err(crate::Error::config("No targets configured"));
        }

        // Identifiers live in [0, 65535), so that many probes at most.
        if self.targets.len() >= usize::from(u16::MAX) {
            return Err(crate::Error::config(format!(
                "Too many targets: {} (max {})",
                self.targets.len(),
                u16::MAX - 1
            )));
        }

        let mut seen = HashSet::with_capacity(self.targets.len());
        for target in &self.targets {
            if !seen.insert(target) {
                return Err(crate::Error::config(format!(
                    "Duplicate target: {}",
                    target
                )));
            }
        }

        if self.reply_channel_capacity == 0 {
            return Err(crate::Error::config("Reply channel capacity must be > 0"));
        }

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }
}

/// Identifier assignment strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierStrategy {
    /// Target `i` (zero based) gets identifier `i + 1`
    #[default]
    Sequential,
    /// Distinct identifiers drawn at random from `[0, 65535)`
    Random,
}

/// Reply correlation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Identifier and sequence must both equal the outstanding request
    #[default]
    IdentifierAndSequence,
    /// Any reply carrying the probe's identifier resolves the request
    IdentifierOnly,
}

/// Parse a list of target arguments into IPv4 addresses
///
/// Each argument may itself be a comma separated list, so `["a,b", "c"]`
/// yields three targets. Whitespace around entries is ignored.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] for an empty list, an empty entry,
/// or anything that is not a dotted-quad IPv4 literal.
pub fn parse_targets<S: AsRef<str>>(args: &[S]) -> Result<Vec<Ipv4Addr>, crate::Error> {
    let mut targets = Vec::new();

    for arg in args {
        for entry in arg.as_ref().split(',') {
            let entry = entry.trim();
            let ip = entry.parse::<Ipv4Addr>().map_err(|_| {
                crate::Error::invalid_input(format!("{} is an invalid ip address", entry))
            })?;
            targets.push(ip);
        }
    }

    if targets.is_empty() {
        return Err(crate::Error::invalid_input(
            "missing remote ip address(es) to monitor",
        ));
    }

    Ok(targets)
}

fn default_reply_channel_capacity() -> usize {
    16
}

fn default_event_channel_capacity() -> usize {
    1000
}
