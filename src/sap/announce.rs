//! SAP announcer: periodic multicast announcement of every Live slot's
//! AES67 SDP to 224.2.127.254:9875 (RFC 2974).

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::net::random_u32;
use crate::{SAP_MULTICAST_ADDR, SAP_PORT};

/// Multicast TTL for SAP announcements
const SAP_TTL: u32 = 255;

/// Base announcement interval; each cycle jitters within ±3s of this
const ANNOUNCE_BASE_MS: u64 = 30_000;
const ANNOUNCE_JITTER_MS: u64 = 3_000;

/// One announcement: the SDP body of a Live slot's AES67 flow
#[derive(Debug, Clone)]
pub struct SapEntry {
    pub slot_id: u8,
    pub sdp: String,
}

/// Snapshot provider: called once per cycle, returns the Live slots.
/// The manager copies these out under its mutex.
pub type SnapshotFn = Box<dyn Fn() -> Vec<SapEntry> + Send>;

/// Fold the SDP body into the 16-bit SAP message id hash.
/// Stable for unchanged SDP so re-announcements carry the same id; any
/// change to the body produces a new id (RFC 2974 §3).
pub fn message_id_hash(sdp: &str) -> u16 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in sdp.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    (hash ^ (hash >> 16)) as u16
}

/// Build one SAP announcement packet.
///
/// Header: V=1, IPv4 origin, announce, no auth, no encryption, no
/// compression; then the message id hash, the originating source address,
/// the payload type string, and the SDP body.
pub fn build_sap_packet(origin: Ipv4Addr, sdp: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + 16 + sdp.len());

    // Byte 0: V=1 (001x xxxx), A=0 (IPv4), R=0, T=0 (announce), E=0, C=0
    packet.push(0x20);
    // Byte 1: authentication length = 0
    packet.push(0);
    // Bytes 2-3: message id hash
    packet.extend_from_slice(&message_id_hash(sdp).to_be_bytes());
    // Bytes 4-7: originating source
    packet.extend_from_slice(&origin.octets());
    // Payload type, null-terminated
    packet.extend_from_slice(b"application/sdp\0");
    packet.extend_from_slice(sdp.as_bytes());

    packet
}

/// Background announcer. Runs independently of all slots; one failed slot
/// never affects the announcements of the others.
pub struct SapAnnouncer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SapAnnouncer {
    /// Start the announcer thread.
    ///
    /// `snapshot` is invoked once per cycle; `source_ip` fills the SAP
    /// origin field; `interface` selects the outbound multicast interface.
    pub fn start(
        source_ip: Ipv4Addr,
        interface: Option<Ipv4Addr>,
        snapshot: SnapshotFn,
    ) -> io::Result<Self> {
        let socket = Self::create_socket(interface)?;
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let thread = thread::spawn(move || {
            Self::announce_loop(thread_running, socket, source_ip, snapshot);
        });

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    fn create_socket(interface: Option<Ipv4Addr>) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))?;
        socket.set_multicast_ttl_v4(SAP_TTL)?;

        if let Some(iface) = interface {
            socket.set_multicast_if_v4(&iface)?;
        }

        Ok(socket.into())
    }

    fn announce_loop(
        running: Arc<AtomicBool>,
        socket: UdpSocket,
        source_ip: Ipv4Addr,
        snapshot: SnapshotFn,
    ) {
        let dest = SocketAddrV4::new(SAP_MULTICAST_ADDR, SAP_PORT);

        while running.load(Ordering::SeqCst) {
            for entry in snapshot() {
                let packet = build_sap_packet(source_ip, &entry.sdp);
                match socket.send_to(&packet, dest) {
                    Ok(_) => debug!("announced slot {} via SAP", entry.slot_id),
                    Err(e) => warn!("SAP send for slot {} failed: {}", entry.slot_id, e),
                }
            }

            // 30s ±3s, sliced so stop() is observed promptly
            let jitter = (random_u32() as u64) % (2 * ANNOUNCE_JITTER_MS);
            let mut remaining = ANNOUNCE_BASE_MS - ANNOUNCE_JITTER_MS + jitter;
            while remaining > 0 && running.load(Ordering::SeqCst) {
                let slice = remaining.min(250);
                thread::sleep(Duration::from_millis(slice));
                remaining -= slice;
            }
        }
    }

    /// Stop the announcer and join its thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SapAnnouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_layout() {
        let sdp = "v=0\r\ns=Test\r\n";
        let origin = Ipv4Addr::new(192, 168, 1, 5);
        let packet = build_sap_packet(origin, sdp);

        assert_eq!(packet[0], 0x20); // V=1, IPv4, announce
        assert_eq!(packet[1], 0); // no auth
        assert_eq!(&packet[4..8], &[192, 168, 1, 5]);

        let mime_end = 8 + b"application/sdp\0".len();
        assert_eq!(&packet[8..mime_end], b"application/sdp\0");
        assert_eq!(&packet[mime_end..], sdp.as_bytes());
    }

    #[test]
    fn test_message_id_stable_and_body_sensitive() {
        let a = message_id_hash("v=0\r\ns=Studio A\r\n");
        let b = message_id_hash("v=0\r\ns=Studio A\r\n");
        let c = message_id_hash("v=0\r\ns=Studio B\r\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_announcer_sends_and_stops() {
        // Point the announcer's snapshot at a single fake entry and watch
        // the first cycle fire immediately.
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let local = receiver.local_addr().unwrap();

        // Rebind the announcer's destination via a plain socket send to the
        // same packet bytes; the loop itself always targets the SAP group,
        // so here we only verify the builder output end to end.
        let packet = build_sap_packet(Ipv4Addr::LOCALHOST, "v=0\r\n");
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&packet, local).unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &packet[..]);

        // Announcer lifecycle: starts, then stops promptly
        let mut announcer =
            SapAnnouncer::start(Ipv4Addr::LOCALHOST, None, Box::new(|| Vec::new())).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        announcer.stop();
    }
}
