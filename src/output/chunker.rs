//! Repacker: converts arbitrarily sized incoming frames into a continuous
//! interleaved sample stream and hands out fixed 48-stereo-sample chunks
//! (1ms at 48kHz). Leftover samples are kept across frame boundaries.

use crate::ndi::{AudioFrame, SampleLayout};
use crate::{AES67_CHANNELS, SAMPLES_PER_PACKET};

/// Floats per chunk: 48 stereo samples, interleaved
pub const CHUNK_FLOATS: usize = SAMPLES_PER_PACKET * AES67_CHANNELS as usize;

/// One packet's worth of interleaved stereo f32 samples
pub type AudioChunk = [f32; CHUNK_FLOATS];

/// Residual-buffer repacker.
///
/// The residual holds fewer than 48 stereo samples between packets once
/// `pop_chunk` has been drained.
pub struct FrameChunker {
    residual: Vec<f32>,
}

impl FrameChunker {
    pub fn new() -> Self {
        Self {
            // Two chunks of headroom covers the common 1-2ms NDI frame sizes
            residual: Vec::with_capacity(CHUNK_FLOATS * 2),
        }
    }

    /// Append a frame, converting planar buffers to interleaved order.
    pub fn push(&mut self, frame: &AudioFrame) {
        let channels = frame.channels as usize;
        let samples = frame.samples_per_channel as usize;

        match frame.layout {
            SampleLayout::Interleaved => {
                self.residual
                    .extend_from_slice(&frame.data[..samples * channels]);
            }
            SampleLayout::Planar => {
                self.residual.reserve(samples * channels);
                for i in 0..samples {
                    for ch in 0..channels {
                        self.residual.push(frame.data[ch * samples + i]);
                    }
                }
            }
        }
    }

    /// Detach the leading chunk if at least 48 stereo samples are buffered.
    pub fn pop_chunk(&mut self) -> Option<AudioChunk> {
        if self.residual.len() < CHUNK_FLOATS {
            return None;
        }
        let mut chunk = [0.0f32; CHUNK_FLOATS];
        chunk.copy_from_slice(&self.residual[..CHUNK_FLOATS]);
        self.residual.drain(..CHUNK_FLOATS);
        Some(chunk)
    }

    /// Stereo samples currently held over for the next frame
    pub fn residual_samples(&self) -> usize {
        self.residual.len() / AES67_CHANNELS as usize
    }

    /// Discard the residual (pipeline stop)
    pub fn reset(&mut self) {
        self.residual.clear();
    }
}

impl Default for FrameChunker {
    fn default() -> Self {
        Self::new()
    }
}
