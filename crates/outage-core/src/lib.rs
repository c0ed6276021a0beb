// # outage-core
//
// Core library for the background connectivity outage prober.
//
// ## Architecture Overview
//
// This library provides everything except the raw socket and the process shell:
// - **Transport**: Trait for sending echo requests and reading ICMP messages
// - **EventSink**: Trait for persisting timestamped event records
// - **MonitorEngine**: Orchestrates the receiver and one probe per target
// - **ProbeRegistry**: Identifier → probe routing table, built once at startup
// - **Probe**: Per-target Healthy/Outage state machine
//
// ## Design Principles
//
// 1. **One socket, many probes**: A single receiver demultiplexes by identifier
// 2. **Edge-triggered**: Only state transitions produce outage events
// 3. **Never block the receiver**: Replies are handed off with `try_send`
// 4. **Library-First**: The daemon is a thin shell around `MonitorEngine`

pub mod config;
pub mod engine;
pub mod error;
pub mod packet;
pub mod probe;
pub mod receiver;
pub mod registry;
pub mod sink;
pub mod traits;

// Re-export core types for convenience
pub use config::{IdentifierStrategy, MatchPolicy, MonitorConfig, parse_targets};
pub use engine::{MonitorEngine, MonitorEvent, Recorder};
pub use error::{Error, Result};
pub use packet::{EchoReply, EchoRequest};
pub use probe::{PROBE_INTERVAL, Probe, ProbeState, REPLY_TIMEOUT};
pub use registry::ProbeRegistry;
pub use sink::{FileSink, MemorySink};
pub use traits::{EventSink, Transport};
