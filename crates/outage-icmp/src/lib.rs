// # Raw ICMP Transport
//
// This crate provides the socket-backed `Transport` for the outage prober.
//
// ## Socket
//
// One raw `AF_INET`/`IPPROTO_ICMP` socket, bound to `0.0.0.0`, in
// non-blocking mode and registered with the tokio reactor through
// `AsyncFd`. The kernel delivers every inbound ICMP message to it, IPv4
// header included; the header is stripped before the bytes are returned.
//
// Datagram ICMP sockets (`SOCK_DGRAM`) are not used: the kernel rewrites
// the echo identifier on them, which breaks demultiplexing by identifier.
//
// ## Privileges
//
// Opening the socket needs root or `CAP_NET_RAW`.
//
// ## Platform Support
//
// Unix only. On other platforms `IcmpSocket::open` always fails.

use outage_core::packet::EchoRequest;
use outage_core::traits::Transport;
use outage_core::{Error, Result};
use std::net::Ipv4Addr;

/// Receive buffer size: the largest possible IPv4 datagram
///
/// The socket sees every ICMP message the host receives, including large
/// echoes on jumbo-MTU links and loopback; a shorter buffer truncates them.
pub const RECV_BUFFER_LEN: usize = 65535;

#[cfg(unix)]
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

#[cfg(unix)]
use std::net::SocketAddrV4;

#[cfg(unix)]
use tokio::io::Interest;

#[cfg(unix)]
use tokio::io::unix::AsyncFd;

#[cfg(unix)]
use tracing::{debug, trace};

/// Raw ICMPv4 socket shared by the receiver and every probe
#[cfg(unix)]
pub struct IcmpSocket {
    inner: AsyncFd<Socket>,
}

#[cfg(unix)]
impl IcmpSocket {
    /// Open, configure and register the socket
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the socket cannot be opened (usually
    /// missing privileges) and `Error::Io` for any later setup step.
    pub fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(|e| {
            Error::config(format!(
                "Failed to open raw ICMP socket: {} (root or CAP_NET_RAW required)",
                e
            ))
        })?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))?;

        // Safety: `socket` is an open descriptor owned by the `AsyncFd` for
        // its whole lifetime, and `Socket::as_raw_fd` always returns it.
        #[allow(unsafe_code)]
        let inner = unsafe { AsyncFd::register(socket) }.map_err(std::io::Error::from)?;
        debug!("Raw ICMP socket open");

        Ok(Self { inner })
    }
}

#[cfg(unix)]
#[async_trait::async_trait]
impl Transport for IcmpSocket {
    async fn send(&self, target: Ipv4Addr, request: &EchoRequest) -> Result<()> {
        let bytes = request.encode();
        let addr = SockAddr::from(SocketAddrV4::new(target, 0));

        let written = self
            .inner
            .async_io(Interest::WRITABLE, |socket| socket.send_to(&bytes, &addr))
            .await
            .map_err(|e| Error::send(e.to_string()))?;

        if written != bytes.len() {
            return Err(Error::send(format!(
                "short write: {} of {} bytes",
                written,
                bytes.len()
            )));
        }

        trace!(
            "Sent echo request id {} seq {} to {}",
            request.identifier, request.sequence, target
        );
        Ok(())
    }

    async fn receive(&self) -> Result<(Vec<u8>, Ipv4Addr)> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        let (len, addr) = self
            .inner
            .async_io(Interest::READABLE, |socket| socket.recv_from_into_buf(&mut buf))
            .await
            .map_err(|e| Error::receive(e.to_string()))?;

        let source = addr
            .as_socket_ipv4()
            .map(|addr| *addr.ip())
            .ok_or_else(|| Error::receive("datagram without an IPv4 source address"))?;

        let icmp = outage_core::packet::strip_ipv4_header(&buf[..len])?;
        Ok((icmp.to_vec(), source))
    }
}

/// An extension trait to allow `recv_from` method which writes to a `&mut [u8]`.
///
/// `socket2::Socket::recv_from` only accepts a `MaybeUninit` buffer.
#[cfg(unix)]
trait RecvFrom {
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> std::io::Result<(usize, SockAddr)>;
}

#[cfg(unix)]
impl RecvFrom for Socket {
    // Safety: the `recv` implementation promises not to write uninitialised
    // bytes to the `buf`fer, so this casting is safe.
    #[allow(unsafe_code)]
    fn recv_from_into_buf(&self, buf: &mut [u8]) -> std::io::Result<(usize, SockAddr)> {
        let buf = unsafe {
            &mut *(std::ptr::from_mut::<[u8]>(buf) as *mut [std::mem::MaybeUninit<u8>])
        };
        self.recv_from(buf)
    }
}

/// Placeholder on platforms without raw socket support
#[cfg(not(unix))]
pub struct IcmpSocket {
    _private: (),
}

#[cfg(not(unix))]
impl IcmpSocket {
    pub fn open() -> Result<Self> {
        Err(Error::config(
            "Raw ICMP sockets are only supported on unix platforms",
        ))
    }
}

#[cfg(not(unix))]
#[async_trait::async_trait]
impl Transport for IcmpSocket {
    async fn send(&self, _target: Ipv4Addr, _request: &EchoRequest) -> Result<()> {
        Err(Error::send("unsupported platform"))
    }

    async fn receive(&self) -> Result<(Vec<u8>, Ipv4Addr)> {
        Err(Error::receive("unsupported platform"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_reports_missing_privileges_as_config_error() {
        // Succeeds as root or with CAP_NET_RAW; otherwise must be a
        // configuration error the daemon can exit on.
        match IcmpSocket::open() {
            Ok(_) => {}
            Err(e) => {
                assert!(matches!(e, Error::Config(_)), "unexpected error: {}", e);
                assert!(e.to_string().contains("CAP_NET_RAW"));
            }
        }
    }

    #[tokio::test]
    async fn receive_keeps_replies_larger_than_an_ethernet_frame() {
        use outage_core::packet::{EchoReply, parse_echo_reply};
        use std::time::Duration;

        // Needs root or CAP_NET_RAW; covered by the test above otherwise.
        let Ok(socket) = IcmpSocket::open() else {
            return;
        };

        let payload = vec![0xab; 2000];
        let reply = EchoReply::new(4242, 7).encode(&payload);
        assert_eq!(reply.len(), 2008);

        let loopback = SockAddr::from(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        socket.inner.get_ref().send_to(&reply, &loopback).unwrap();

        // Other ICMP traffic on the host may arrive first.
        let received = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (bytes, source) = socket.receive().await.unwrap();
                if let Ok(Some(parsed)) = parse_echo_reply(&bytes) {
                    if parsed.identifier == 4242 {
                        return (bytes, source, parsed);
                    }
                }
            }
        })
        .await
        .expect("looped-back reply arrives");

        let (bytes, source, parsed) = received;
        assert_eq!(source, Ipv4Addr::LOCALHOST);
        assert_eq!(bytes.len(), 2008);
        assert_eq!(parsed.sequence, 7);
        assert_eq!(&bytes[8..], payload.as_slice());
    }

    #[test]
    fn recv_into_initialised_buffer() {
        let (a, b) = std::os::unix::net::UnixDatagram::pair().unwrap();
        let socket = Socket::from(std::os::fd::OwnedFd::from(b));

        a.send(&[1, 2, 3]).unwrap();
        let mut buf = [0u8; 8];
        let (len, _) = socket.recv_from_into_buf(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
    }
}
