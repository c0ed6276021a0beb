// # Transport Trait
//
// Defines the interface to the single ICMP socket shared by every probe.
//
// ## Implementations
//
// - Raw ICMPv4 socket (unix): `outage-icmp` crate
// - Simulated networks: test doubles and the `demos` crate
//
// ## Usage
//
// ```rust,ignore
// use outage_core::Transport;
// use outage_core::packet::{EchoRequest, parse_echo_reply};
//
// let transport: Arc<dyn Transport> = /* Transport implementation */;
//
// // Any probe may send
// transport.send(target, &EchoRequest::new(1, 1)).await?;
//
// // Only the receiver reads
// let (bytes, source) = transport.receive().await?;
// let reply = parse_echo_reply(&bytes)?;
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::packet::EchoRequest;

/// Trait for the shared ICMP transport
///
/// One instance is opened per process and shared behind an `Arc` by every
/// probe (writers) and the receiver (the only reader).
///
/// ## Concurrency
///
/// - `send()` may be called concurrently from any number of tasks
/// - `receive()` is called from exactly one task at a time
/// - Both must be cancellation-safe: the engine drops in-flight calls on
///   shutdown
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serialize `request` and write it toward `target`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The request was handed to the network
    /// - `Err(Error::Send)`: Serialization or socket write failed. The
    ///   caller records the failure and keeps probing.
    async fn send(&self, target: Ipv4Addr, request: &EchoRequest) -> Result<(), crate::Error>;

    /// Wait for the next inbound ICMP message
    ///
    /// Implementations strip any IP header, returning the ICMP message bytes
    /// and the address they came from.
    ///
    /// # Returns
    ///
    /// - `Ok((bytes, source))`: One inbound message
    /// - `Err(Error::Receive)`: Socket failure. Treated as transient; the
    ///   receiver records it and reads again.
    /// - `Err(Error::Parse)`: The datagram arrived but its IP framing was
    ///   invalid. Recorded as a parse failure, then the receiver reads again.
    async fn receive(&self) -> Result<(Vec<u8>, Ipv4Addr), crate::Error>;
}
