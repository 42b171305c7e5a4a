//! AES67 egress: repacking into 1ms chunks, RTP packetization, and the
//! multicast send socket.

pub mod chunker;
pub mod emitter;
pub mod rtp;

pub use chunker::{AudioChunk, FrameChunker, CHUNK_FLOATS};
pub use emitter::MulticastEmitter;
pub use rtp::{PcmEncoding, RtpPacketBuilder};
