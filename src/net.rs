//! Outbound interface selection for multicast sends.
//! The interface comes from the MCAST_IFACE environment variable (interface
//! name), falling back to the first non-loopback IPv4 interface.

use std::net::Ipv4Addr;

use get_if_addrs::{get_if_addrs, IfAddr};
use thiserror::Error;

/// Environment variable naming the outbound multicast interface
pub const MCAST_IFACE_ENV: &str = "MCAST_IFACE";

#[derive(Error, Debug)]
pub enum NetError {
    #[error("interface not found")]
    InterfaceNotFound,

    #[error("failed to enumerate interfaces: {0}")]
    Enumerate(#[from] std::io::Error),
}

/// Resolve the outbound multicast interface.
///
/// Returns the IPv4 address of the interface named by `MCAST_IFACE`, or the
/// first non-loopback IPv4 interface when the variable is unset. `Ok(None)`
/// means no usable interface was found and the OS default route applies.
pub fn outbound_interface() -> Result<Option<Ipv4Addr>, NetError> {
    let ifaces = get_if_addrs()?;
    resolve(std::env::var(MCAST_IFACE_ENV).ok(), &ifaces)
}

fn resolve(
    wanted: Option<String>,
    ifaces: &[get_if_addrs::Interface],
) -> Result<Option<Ipv4Addr>, NetError> {
    if let Some(name) = wanted {
        for iface in ifaces {
            if iface.name == name {
                if let IfAddr::V4(ref v4) = iface.addr {
                    return Ok(Some(v4.ip));
                }
            }
        }
        return Err(NetError::InterfaceNotFound);
    }

    for iface in ifaces {
        if iface.is_loopback() {
            continue;
        }
        if let IfAddr::V4(ref v4) = iface.addr {
            return Ok(Some(v4.ip));
        }
    }

    Ok(None)
}

/// Source IP for SDP origin lines and the SAP origin field.
pub fn source_ip() -> Ipv4Addr {
    match outbound_interface() {
        Ok(Some(ip)) => ip,
        _ => Ipv4Addr::UNSPECIFIED,
    }
}

/// Generate a pseudo-random 32-bit value seeded from the system clock.
/// Used for SSRC assignment and RTP sequence/timestamp seeds.
pub(crate) fn random_u32() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seed = now.as_nanos() as u32;
    let mut x = seed ^ 0xDEADBEEF;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_u32_varies() {
        let a = random_u32();
        std::thread::sleep(std::time::Duration::from_micros(10));
        let b = random_u32();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_iface_name_is_error() {
        let ifaces = get_if_addrs().unwrap();
        let result = resolve(Some("no-such-iface-zz99".to_string()), &ifaces);
        assert!(matches!(result, Err(NetError::InterfaceNotFound)));
    }

    #[test]
    fn test_default_selection_skips_loopback() {
        let ifaces = get_if_addrs().unwrap();
        if let Ok(Some(ip)) = resolve(None, &ifaces) {
            assert!(!ip.is_loopback());
        }
    }
}
