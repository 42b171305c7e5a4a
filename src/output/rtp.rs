//! RTP packet builder for the AES67 (L24) and monitor (L16) flows.
//! Builds RTP packets with big-endian linear PCM payloads.

use crate::output::chunker::{AudioChunk, CHUNK_FLOATS};
use crate::{PT_L16, PT_L24, SAMPLES_PER_PACKET};

/// RTP header size in bytes
pub const RTP_HEADER_LEN: usize = 12;

/// PCM payload encoding. The two flows differ only in sample width, scale,
/// and payload type, so a tagged variant covers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEncoding {
    /// 24-bit big-endian signed PCM, dynamic payload type 98
    L24,
    /// 16-bit big-endian signed PCM, static payload type 11
    L16,
}

impl PcmEncoding {
    pub fn payload_type(self) -> u8 {
        match self {
            PcmEncoding::L24 => PT_L24,
            PcmEncoding::L16 => PT_L16,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            PcmEncoding::L24 => 3,
            PcmEncoding::L16 => 2,
        }
    }

    /// Payload size for one 48-stereo-sample chunk
    pub fn payload_len(self) -> usize {
        CHUNK_FLOATS * self.bytes_per_sample()
    }

    /// Total packet size for one chunk
    pub fn packet_len(self) -> usize {
        RTP_HEADER_LEN + self.payload_len()
    }
}

/// RTP packet builder for one flow.
/// Manages sequence numbers and timestamps automatically; both are seeded
/// randomly when the slot engine starts and advance per packet.
pub struct RtpPacketBuilder {
    /// Synchronization source identifier (fixed per slot)
    ssrc: u32,
    /// Current sequence number (wraps at 65535)
    sequence: u16,
    /// Current timestamp (sample count, +48 per packet)
    timestamp: u32,
    /// Payload encoding for this flow
    encoding: PcmEncoding,
    /// Pre-allocated packet buffer
    packet_buffer: Vec<u8>,
}

impl RtpPacketBuilder {
    /// Create a builder with the given counter seeds.
    pub fn new(ssrc: u32, encoding: PcmEncoding, seq_seed: u16, ts_seed: u32) -> Self {
        Self {
            ssrc,
            sequence: seq_seed,
            timestamp: ts_seed,
            encoding,
            packet_buffer: vec![0u8; encoding.packet_len()],
        }
    }

    /// Build an RTP packet from one chunk.
    /// Returns a slice of the internal buffer containing the complete packet.
    pub fn build_packet(&mut self, chunk: &AudioChunk) -> &[u8] {
        let packet_len = self.encoding.packet_len();
        debug_assert_eq!(self.packet_buffer.len(), packet_len);

        // RTP header (12 bytes)
        // Byte 0: V=2, P=0, X=0, CC=0 -> 0x80
        self.packet_buffer[0] = 0x80;
        // Byte 1: M=0, PT
        self.packet_buffer[1] = self.encoding.payload_type() & 0x7F;
        // Bytes 2-3: Sequence number (big-endian)
        self.packet_buffer[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        // Bytes 4-7: Timestamp (big-endian)
        self.packet_buffer[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        // Bytes 8-11: SSRC (big-endian)
        self.packet_buffer[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        match self.encoding {
            PcmEncoding::L24 => {
                convert_float_to_24bit_be(chunk, &mut self.packet_buffer[RTP_HEADER_LEN..])
            }
            PcmEncoding::L16 => {
                convert_float_to_16bit_be(chunk, &mut self.packet_buffer[RTP_HEADER_LEN..])
            }
        }

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(SAMPLES_PER_PACKET as u32);

        &self.packet_buffer[..packet_len]
    }

    /// Current sequence number (for diagnostics)
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current timestamp (for diagnostics)
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }
}

/// Quantize one float sample to a signed integer of `2^(bits-1)` full scale.
///
/// Scaling by full scale and clamping the integer result maps out-of-range
/// input to the true rail values: +2.0 -> 0x7FFFFF and -2.0 -> 0x800000 in
/// the 24-bit case.
#[inline]
fn quantize(sample: f32, full_scale: f64) -> i32 {
    let scaled = (sample as f64 * full_scale).round();
    scaled.clamp(-full_scale, full_scale - 1.0) as i32
}

/// Convert 32-bit float to 24-bit big-endian PCM.
/// The receiver reverses this with:
///   sample_i32 = ((b0 << 24) | (b1 << 16) | (b2 << 8)) >> 8  (sign-extend)
///   float = sample_i32 / 8388608.0
pub fn convert_float_to_24bit_be(input: &[f32], output: &mut [u8]) {
    for (i, &sample) in input.iter().enumerate() {
        let offset = i * 3;
        if offset + 2 >= output.len() {
            break;
        }

        let sample_i24 = quantize(sample, 8_388_608.0);

        // Extract low 24 bits as big-endian
        // For -1.0 -> -8388608 = 0xFF800000: & 0xFFFFFF gives 0x800000
        // For  1.0 ->  8388607 = 0x007FFFFF: & 0xFFFFFF gives 0x7FFFFF
        let u24 = (sample_i24 as u32) & 0x00FF_FFFF;
        output[offset] = (u24 >> 16) as u8; // MSB
        output[offset + 1] = (u24 >> 8) as u8;
        output[offset + 2] = u24 as u8; // LSB
    }
}

/// Convert 32-bit float to 16-bit big-endian PCM (monitor flow).
pub fn convert_float_to_16bit_be(input: &[f32], output: &mut [u8]) {
    for (i, &sample) in input.iter().enumerate() {
        let offset = i * 2;
        if offset + 1 >= output.len() {
            break;
        }

        let sample_i16 = quantize(sample, 32_768.0);
        output[offset..offset + 2].copy_from_slice(&(sample_i16 as i16).to_be_bytes());
    }
}
