//! ICMPv4 echo codec
//!
//! Only the two message types the prober cares about are modelled: the echo
//! request it sends and the echo reply it correlates. Everything else that
//! arrives on the socket is recognised just enough to be discarded.
//!
//! Layout of an echo message (RFC 792):
//!
//! ```text
//!  0               1               2               3
//! +---------------+---------------+-------------------------------+
//! |     Type      |     Code      |           Checksum            |
//! +---------------+---------------+-------------------------------+
//! |          Identifier           |        Sequence Number        |
//! +-------------------------------+-------------------------------+
//! |     Data ...
//! ```

use crate::error::{Error, Result};

/// ICMP type of an echo reply
pub const ICMP_ECHO_REPLY: u8 = 0;

/// ICMP type of an echo request
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// Fixed payload carried by every request
pub const ECHO_PAYLOAD: &[u8] = b"12345677890";

/// Size of the echo header (type, code, checksum, identifier, sequence)
pub const ECHO_HEADER_LEN: usize = 8;

const IPV4_MIN_HEADER_LEN: usize = 20;

/// An outbound echo request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoRequest {
    /// Identifier of the sending probe
    pub identifier: u16,
    /// Sequence of the outstanding request
    pub sequence: u16,
    /// Payload bytes
    pub payload: &'static [u8],
}

impl EchoRequest {
    /// Create a request carrying the fixed payload
    pub fn new(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
            payload: ECHO_PAYLOAD,
        }
    }

    /// Serialize to wire format with a valid checksum
    pub fn encode(&self) -> Vec<u8> {
        encode_echo(ICMP_ECHO_REQUEST, self.identifier, self.sequence, self.payload)
    }
}

/// A correlated echo reply, routed to exactly one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EchoReply {
    /// Identifier copied back by the remote host
    pub identifier: u16,
    /// Sequence copied back by the remote host
    pub sequence: u16,
}

impl EchoReply {
    /// Create a reply
    pub fn new(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
        }
    }

    /// Serialize to wire format, as the remote host would
    ///
    /// Used by simulated transports; the prober itself never sends replies.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        encode_echo(ICMP_ECHO_REPLY, self.identifier, self.sequence, payload)
    }
}

impl From<&EchoRequest> for EchoReply {
    fn from(request: &EchoRequest) -> Self {
        Self::new(request.identifier, request.sequence)
    }
}

/// Parse an ICMP message, keeping it only if it is an echo reply
///
/// # Returns
///
/// - `Ok(Some(reply))`: a well-formed echo reply
/// - `Ok(None)`: a well-formed message of any other type (including our
///   own echo requests looped back by the kernel)
/// - `Err(Error::Parse)`: truncated message or checksum mismatch
pub fn parse_echo_reply(bytes: &[u8]) -> Result<Option<EchoReply>> {
    if bytes.len() < ECHO_HEADER_LEN {
        return Err(Error::parse(format!(
            "message too short: {} bytes (need {})",
            bytes.len(),
            ECHO_HEADER_LEN
        )));
    }

    if checksum(bytes) != 0 {
        return Err(Error::parse("checksum mismatch"));
    }

    if bytes[0] != ICMP_ECHO_REPLY || bytes[1] != 0 {
        return Ok(None);
    }

    Ok(Some(EchoReply {
        identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
        sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
    }))
}

/// Strip the IPv4 header that raw sockets deliver ahead of the ICMP message
pub fn strip_ipv4_header(bytes: &[u8]) -> Result<&[u8]> {
    let Some(&first) = bytes.first() else {
        return Err(Error::parse("empty datagram"));
    };

    let version = first >> 4;
    if version != 4 {
        return Err(Error::parse(format!("unexpected IP version {}", version)));
    }

    let header_len = usize::from(first & 0x0f) * 4;
    if header_len < IPV4_MIN_HEADER_LEN || header_len > bytes.len() {
        return Err(Error::parse(format!(
            "invalid IPv4 header length {} for {} byte datagram",
            header_len,
            bytes.len()
        )));
    }

    Ok(&bytes[header_len..])
}

fn encode_echo(icmp_type: u8, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ECHO_HEADER_LEN + payload.len());
    buf.extend_from_slice(&[icmp_type, 0, 0, 0]);
    buf.extend_from_slice(&identifier.to_be_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(payload);

    let sum = checksum(&buf);
    buf[2..4].copy_from_slice(&sum.to_be_bytes());
    buf
}

/// RFC 1071 internet checksum
///
/// Over a message whose checksum field is already filled in, a valid
/// message sums to zero.
fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
