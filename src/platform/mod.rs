//! The media platform the engine delegates decoding and rendering to.
//!
//! Two API styles sit on top of one shared media model: a synchronous
//! filter graph ([`graph`]) and an event-driven media session
//! ([`session`]). [`rodio`] implements both on the local audio output.

use std::time::Duration;

use crate::error::NativeError;

pub mod graph;
pub mod rodio;
pub mod session;
pub mod topology;

#[cfg(test)]
pub(crate) mod fake;

/// Major type of an elementary stream inside a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorType {
    Audio,
    Video,
    Other,
}

/// Renderer an output node binds to. Audio is the only renderer the
/// platform provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Audio,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub selected: bool,
    pub major_type: MajorType,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
}

impl StreamDescriptor {
    pub fn audio(index: usize, channels: u16, sample_rate: u32) -> Self {
        Self {
            index,
            selected: true,
            major_type: MajorType::Audio,
            channels: Some(channels),
            sample_rate: Some(sample_rate),
        }
    }
}

/// Snapshot of a source's streams; one per presentation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresentationDescriptor {
    pub streams: Vec<StreamDescriptor>,
    pub duration: Option<Duration>,
}

impl PresentationDescriptor {
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.get(index)
    }
}

/// A resolved media source.
pub trait MediaSource: Send + Sync + 'static {
    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor, NativeError>;

    /// Synchronous; raises no events.
    fn shutdown(&self);
}
