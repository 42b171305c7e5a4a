//! SDP text builder for the AES67 and monitor flows.

use std::net::Ipv4Addr;

use crate::slot::SlotConfig;
use crate::{PT_L16, PT_L24};

/// Environment variable carrying the PTP grandmaster identity
pub const PTP_GMID_ENV: &str = "PTP_GMID";
/// Environment variable carrying the PTP domain (default 0)
pub const PTP_DOMAIN_ENV: &str = "PTP_DOMAIN";

/// PTP reference quoted in SDP. The bridge does not synchronize to PTP;
/// it only names the external grandmaster in its announcements.
#[derive(Debug, Clone, Default)]
pub struct PtpConfig {
    /// Grandmaster identity for a=ts-refclk; the attribute is omitted
    /// when unset
    pub gmid: Option<String>,
    /// PTP domain number
    pub domain: u32,
}

impl PtpConfig {
    pub fn from_env() -> Self {
        let gmid = std::env::var(PTP_GMID_ENV).ok().filter(|s| !s.is_empty());
        let domain = std::env::var(PTP_DOMAIN_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Self { gmid, domain }
    }
}

/// Which of the slot's two flows an SDP describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpFlavor {
    /// L24 flow on the configured port; announced via SAP
    Aes67,
    /// L16 flow on port+2; served on demand only
    Monitor,
}

impl SdpFlavor {
    /// Parse the control-surface flavor token
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "aes67" => Some(SdpFlavor::Aes67),
            "monitor" => Some(SdpFlavor::Monitor),
            _ => None,
        }
    }
}

/// Build the SDP text for one flow of one slot. CRLF line endings.
pub fn build_sdp(
    config: &SlotConfig,
    source_ip: Ipv4Addr,
    ptp: &PtpConfig,
    flavor: SdpFlavor,
) -> String {
    let (port, pt, codec) = match flavor {
        SdpFlavor::Aes67 => (config.mcast_port, PT_L24, "L24"),
        SdpFlavor::Monitor => (config.mcast_port + 2, PT_L16, "L16"),
    };

    let mut sdp = format!(
        "v=0\r\n\
         o=- {ssrc} 0 IN IP4 {origin}\r\n\
         s={name}\r\n\
         c=IN IP4 {mcast}/32\r\n\
         t=0 0\r\n\
         a=recvonly\r\n\
         a=clock-domain:PTPv2 {domain}\r\n\
         m=audio {port} RTP/AVP {pt}\r\n\
         a=rtpmap:{pt} {codec}/48000/2\r\n\
         a=ptime:1\r\n\
         a=mediaclk:direct=0\r\n",
        ssrc = config.ssrc,
        origin = source_ip,
        name = config.aes67_stream_name,
        mcast = config.mcast_ip,
        domain = ptp.domain,
        port = port,
        pt = pt,
        codec = codec,
    );

    if let Some(ref gmid) = ptp.gmid {
        sdp.push_str(&format!(
            "a=ts-refclk:ptp=IEEE1588-2008:{}:{}\r\n",
            gmid, ptp.domain
        ));
    }

    sdp
}
