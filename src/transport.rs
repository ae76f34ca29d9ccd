//! UDP transport.
//!
//! Outbound traffic is fire-and-forget: a send that cannot be routed is
//! reported back as [`Error::TransportUnreachable`] and the caller logs it.
//! The receiver never blocks; each poll reads and decodes at most one
//! pending datagram.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::{Error, Result};
use crate::osc::{self, OscMessage};

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// An inbound message together with the address it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub message: OscMessage,
    pub sender: SocketAddr,
}

/// Anything that can hand over inbound OSC messages one at a time.
pub trait MessageSource {
    /// Return the next pending message, or `None` when nothing is waiting.
    /// Must return immediately.
    fn poll_once(&mut self) -> Option<DecodedMessage>;

    /// Local address the source listens on, when it has one.
    fn bound_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Best-effort UDP sender.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
}

impl UdpSender {
    /// Open an unbound-port sender socket.
    pub fn new() -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    /// Send one datagram to `host:port`, resolving the host first.
    pub fn send_to(&self, bytes: &[u8], host: &str, port: u16) -> Result<()> {
        let addr = resolve(host, port)?;
        self.send_to_addr(bytes, addr)
    }

    /// Send one datagram to an already resolved address.
    pub fn send_to_addr(&self, bytes: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket
            .send_to(bytes, addr)
            .map_err(|e| Error::TransportUnreachable {
                target: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Resolve `host:port`, preferring an IPv4 address since senders bind on IPv4.
///
/// May block on a DNS lookup for host names.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let unreachable = |reason: String| Error::TransportUnreachable {
        target: format!("{}:{}", host, port),
        reason,
    };

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| unreachable(e.to_string()))?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| unreachable("host resolved to no address".to_string()))
}

/// Non-blocking UDP receiver decoding one datagram per poll.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl UdpReceiver {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        log::debug!("receiver listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl MessageSource for UdpReceiver {
    fn poll_once(&mut self) -> Option<DecodedMessage> {
        let (len, sender) = match self.socket.recv_from(&mut self.buffer) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
            Err(e) => {
                log::warn!("receive failed: {}", e);
                return None;
            }
        };

        match osc::decode(&self.buffer[..len]) {
            Ok(message) => {
                log::debug!("<- {} {} {:?}", sender, message.address, message.args);
                Some(DecodedMessage { message, sender })
            }
            Err(e) => {
                log::warn!("dropping datagram from {}: {}", sender, e);
                None
            }
        }
    }

    fn bound_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}
