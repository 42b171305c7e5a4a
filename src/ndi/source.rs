//! Frame Source Adapter wrapping the NDI receiver.
//!
//! The slot engine consumes the `FrameSource` trait, so tests can inject
//! synthetic sources; the NDI-backed implementation lives here and is the
//! only place (together with discovery) that touches the grafton-ndi API.

use std::sync::Arc;
use std::time::Duration;

use grafton_ndi::{Finder, FinderOptions, Receiver, ReceiverOptions, NDI};
use log::{debug, info};
use thiserror::Error;

use super::frame::{AudioFrame, SampleLayout};

/// Errors from source connection and frame capture
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source not found")]
    NotFound,

    #[error("failed to create receiver: {0}")]
    Connect(String),

    #[error("source disconnected")]
    Disconnected,
}

/// A blocking provider of audio frames.
///
/// `next_frame` returns `Ok(None)` when no frame arrived within `timeout`
/// (the caller uses this to observe cancellation promptly) and `Err` on
/// terminal receiver failure.
pub trait FrameSource: Send {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, SourceError>;
}

/// Factory that resolves a source name to a connected `FrameSource`.
pub trait SourceConnector: Send + Sync {
    fn connect(&self, name: &str, deadline: Duration) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// NDI-backed source adapter.
///
/// Owns the NDI runtime handle and the source-name string for the life of
/// the receiver. The name backing storage must outlive the receiver: the
/// native library holds a pointer into the connect-time source descriptor,
/// so both live together in this struct.
pub struct NdiAudioSource {
    /// NDI runtime (must be kept alive while the receiver exists)
    _ndi: Arc<NDI>,
    /// The receiver, borrowing the leaked runtime reference below
    receiver: Receiver<'static>,
    /// Source name as matched at connect time
    name: String,
    /// Scratch for planar-to-tight repacking
    scratch: Vec<f32>,
}

impl NdiAudioSource {
    /// Connect to a discovered source by name.
    ///
    /// Runs a discovery pass bounded by `deadline` and matches the name
    /// byte-for-byte against what the finder reports.
    pub fn connect(ndi: &Arc<NDI>, name: &str, deadline: Duration) -> Result<Self, SourceError> {
        // The receiver borrows the NDI runtime. We store the Arc alongside
        // the receiver and leak a reference to it so the borrow checker
        // accepts 'static; the Arc in `_ndi` keeps the runtime alive.
        let ndi_static: &'static Arc<NDI> = Box::leak(Box::new(ndi.clone()));

        let finder_options = FinderOptions::builder().show_local_sources(true).build();
        let finder = Finder::new(ndi_static, &finder_options)
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        let _ = finder.wait_for_sources(deadline.as_millis() as u32);
        let sources = finder
            .get_sources(deadline.as_millis() as u32)
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        let source = sources
            .into_iter()
            .find(|s| s.to_string() == name)
            .ok_or(SourceError::NotFound)?;

        let options = ReceiverOptions::builder(source).build();
        let receiver = Receiver::new(ndi_static, &options)
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        info!("connected NDI receiver to '{}'", name);

        Ok(Self {
            _ndi: ndi.clone(),
            receiver,
            name: name.to_string(),
            scratch: Vec::new(),
        })
    }

    /// Source name this adapter is connected to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy a native audio frame into an owned `AudioFrame`.
    ///
    /// NDI delivers planar float buffers with a per-channel stride that may
    /// include padding; the copy repacks each plane tightly so downstream
    /// code never sees the stride.
    fn convert_frame(&mut self, frame: &grafton_ndi::AudioFrame) -> AudioFrame {
        let channels = frame.channels.max(0) as usize;
        let samples = frame.samples.max(0) as usize;
        let stride_floats = frame.channel_stride_in_bytes.max(0) as usize / 4;

        let planar = channels > 1 && stride_floats >= samples && stride_floats != 0;
        let total = samples * channels;

        self.scratch.clear();
        self.scratch.reserve(total);

        if planar {
            for ch in 0..channels {
                let plane = (ch * stride_floats).min(frame.data.len());
                let end = (plane + samples).min(frame.data.len());
                self.scratch.extend_from_slice(&frame.data[plane..end]);
                // Short plane at the buffer tail: pad with silence
                self.scratch.resize((ch + 1) * samples, 0.0);
            }
        } else {
            let end = total.min(frame.data.len());
            self.scratch.extend_from_slice(&frame.data[..end]);
            self.scratch.resize(total, 0.0);
        }

        AudioFrame {
            sample_rate: frame.sample_rate.max(0) as u32,
            channels: channels as u16,
            samples_per_channel: samples as u32,
            layout: if planar {
                SampleLayout::Planar
            } else {
                SampleLayout::Interleaved
            },
            data: self.scratch.clone(),
        }
    }
}

impl FrameSource for NdiAudioSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, SourceError> {
        match self.receiver.capture_audio(timeout.as_millis() as u32) {
            Ok(Some(frame)) => Ok(Some(self.convert_frame(&frame))),
            Ok(None) => Ok(None),
            Err(e) => {
                debug!("NDI capture error on '{}': {}", self.name, e);
                Err(SourceError::Disconnected)
            }
        }
    }
}

/// `SourceConnector` backed by the NDI runtime.
pub struct NdiConnector {
    ndi: Arc<NDI>,
}

impl NdiConnector {
    pub fn new(ndi: Arc<NDI>) -> Self {
        Self { ndi }
    }
}

impl SourceConnector for NdiConnector {
    fn connect(&self, name: &str, deadline: Duration) -> Result<Box<dyn FrameSource>, SourceError> {
        let source = NdiAudioSource::connect(&self.ndi, name, deadline)?;
        Ok(Box::new(source))
    }
}
