//! Multicast UDP emitter, one socket per RTP flow.
//! Pacing is governed by frame arrival upstream; each packet is sent with a
//! single non-blocking write as soon as it is ready.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// Multicast TTL for RTP flows
const RTP_MULTICAST_TTL: u32 = 32;

/// Result of one packet send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Packet handed to the kernel
    Sent,
    /// Socket buffer full; packet dropped, never retransmitted
    WouldBlock,
    /// Hard send error (counted by the caller, not fatal here)
    Failed,
}

/// UDP sending socket for one flow, bound to the selected outbound
/// interface with loopback disabled.
pub struct MulticastEmitter {
    socket: UdpSocket,
    dest: SocketAddrV4,
}

impl MulticastEmitter {
    /// Create and configure the socket for `dest`.
    ///
    /// `interface` is the outbound interface address; `None` leaves the OS
    /// default route in charge.
    pub fn new(dest: SocketAddrV4, interface: Option<Ipv4Addr>) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket.bind(&SockAddr::from(bind_addr))?;

        socket.set_multicast_ttl_v4(RTP_MULTICAST_TTL)?;
        socket.set_multicast_loop_v4(false)?;

        if let Some(iface) = interface {
            socket.set_multicast_if_v4(&iface)?;
        }

        socket.set_nonblocking(true)?;

        Ok(Self {
            socket: socket.into(),
            dest,
        })
    }

    /// Destination of this flow
    pub fn dest(&self) -> SocketAddrV4 {
        self.dest
    }

    /// Send one packet. Never blocks.
    pub fn send(&self, packet: &[u8]) -> SendOutcome {
        match self.socket.send_to(packet, self.dest) {
            Ok(_) => SendOutcome::Sent,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => SendOutcome::WouldBlock,
            Err(e) => {
                log::debug!("send to {} failed: {}", self.dest, e);
                SendOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_send_to_loopback_dest() {
        // The socket options are multicast-oriented but the send path works
        // for any destination, which is what the engine tests rely on.
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = match receiver.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };

        let emitter = MulticastEmitter::new(dest, None).unwrap();
        assert_eq!(emitter.send(&[1, 2, 3]), SendOutcome::Sent);

        let mut buf = [0u8; 16];
        receiver
            .set_read_timeout(Some(std::time::Duration::from_millis(500)))
            .unwrap();
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
    }

    #[test]
    fn test_multicast_socket_options_accepted() {
        let dest = SocketAddrV4::new(Ipv4Addr::new(239, 69, 0, 1), 5004);
        // Option setup must succeed regardless of routing state
        let emitter = MulticastEmitter::new(dest, None).unwrap();
        assert_eq!(emitter.dest(), dest);
    }
}
