//! Core traits for the outage prober
//!
//! This module defines the abstract interfaces the engine is built on.
//!
//! - [`Transport`]: Send echo requests and receive raw ICMP messages
//! - [`EventSink`]: Persist human-readable event records

pub mod event_sink;
pub mod transport;

pub use event_sink::EventSink;
pub use transport::Transport;
