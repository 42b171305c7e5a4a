//! NDI to AES67 bridge
//!
//! Bridges up to four NDI audio sources onto AES67-compliant RTP multicast
//! flows and announces them via SAP/SDP so Dante-compatible receivers can
//! discover them.
//! - Ingest: NDI audio frames (32-bit float, 48kHz stereo required)
//! - Output: L24 RTP multicast at 1ms packet time, plus a parallel L16
//!   monitor flow on port+2 for tools that cannot decode L24
//!
//! Audio format notes:
//! - AES67 uses 48kHz, 24-bit linear PCM
//! - NDI delivers 32-bit float frames of arbitrary size
//! - We repack into exact 1ms chunks and convert to 24-bit (or 16-bit
//!   for the monitor flow) as needed

pub mod net;
pub mod ndi;
pub mod output;
pub mod sap;
pub mod slot;

pub use ndi::{AudioFrame, FrameSource, NdiConnector, SampleLayout, SourceConnector, SourceError};
pub use sap::{PtpConfig, SdpFlavor};
pub use slot::{ConfigError, SlotConfig, SlotManager, SlotState, SlotStatus};

use std::net::Ipv4Addr;

/// AES67 audio format constants
pub const AES67_SAMPLE_RATE: u32 = 48_000;
pub const AES67_CHANNELS: u16 = 2;

/// Samples per RTP packet (1ms at 48kHz)
pub const SAMPLES_PER_PACKET: usize = 48;

/// RTP payload types: L24 is dynamic, L16/48000/2 is static (RFC 3551)
pub const PT_L24: u8 = 98;
pub const PT_L16: u8 = 11;

/// SAP announcement destination (RFC 2974)
pub const SAP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 2, 127, 254);
pub const SAP_PORT: u16 = 9875;

/// Number of bridge slots
pub const MAX_SLOTS: usize = 4;
