//! NDI audio ingestion: frame type, source adapter, and discovery.

pub mod discovery;
pub mod frame;
pub mod source;

pub use discovery::SourceDirectory;
pub use frame::{AudioFrame, SampleLayout};
pub use source::{FrameSource, NdiConnector, SourceConnector, SourceError};
