//! SAP/SDP announcement: SDP text generation for each flow and the
//! periodic SAP announcer thread.

pub mod announce;
pub mod sdp;

pub use announce::{build_sap_packet, SapAnnouncer, SapEntry};
pub use sdp::{build_sdp, PtpConfig, SdpFlavor};
