//! Audio frame type carried from the NDI receiver into the pipeline.

/// Sample memory layout within a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// Samples alternate per channel: L R L R ...
    Interleaved,
    /// One contiguous plane per channel: L L L ... R R R ...
    Planar,
}

/// An audio frame received from a source.
///
/// The buffer is owned; dropping the frame releases everything. The adapter
/// copies out of the native NDI frame before freeing it, so no pointer into
/// library-owned memory survives past the capture call.
#[derive(Clone)]
pub struct AudioFrame {
    /// Sample rate in Hz (e.g., 48000)
    pub sample_rate: u32,
    /// Number of audio channels
    pub channels: u16,
    /// Number of samples per channel
    pub samples_per_channel: u32,
    /// Buffer layout
    pub layout: SampleLayout,
    /// f32 audio samples, `samples_per_channel * channels` values
    pub data: Vec<f32>,
}

impl AudioFrame {
    /// Create a silent interleaved frame
    pub fn silent(sample_rate: u32, channels: u16, samples_per_channel: u32) -> Self {
        let total = samples_per_channel as usize * channels as usize;
        Self {
            sample_rate,
            channels,
            samples_per_channel,
            layout: SampleLayout::Interleaved,
            data: vec![0.0f32; total],
        }
    }
}
