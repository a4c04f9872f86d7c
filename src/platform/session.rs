//! Event-driven media-session style API.
//!
//! Long operations complete through an [`AsyncCallback`]. A callback is
//! always invoked on a platform-owned thread, never from inside the call
//! that registered it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::topology::Topology;
use super::{MediaSource, PresentationDescriptor};
use crate::error::NativeError;

/// Opaque completion handed to an [`AsyncCallback`] and consumed by the
/// matching `end_*` call.
pub struct AsyncResult {
    payload: Result<Box<dyn Any + Send>, NativeError>,
}

impl AsyncResult {
    pub fn new<T: Any + Send>(value: Result<T, NativeError>) -> Self {
        Self {
            payload: value.map(|v| Box::new(v) as Box<dyn Any + Send>),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.payload.is_ok()
    }

    /// Extract the payload; a payload of another type is `InvalidType`.
    pub fn into_value<T: Any>(self) -> Result<T, NativeError> {
        let boxed = self.payload?;
        boxed
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| NativeError::InvalidType)
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Ok(_) => f.write_str("AsyncResult(ok)"),
            Err(e) => write!(f, "AsyncResult(err: {e})"),
        }
    }
}

pub trait AsyncCallback: Send + Sync {
    fn invoke(&self, result: AsyncResult);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyStatus {
    Ready,
    Started,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    TopologySet,
    TopologyStatus(TopologyStatus),
    SessionStarted,
    SessionPaused,
    SessionStopped,
    EndOfPresentation,
    SessionEnded,
    /// The source renegotiated its streams; carries the new descriptor
    NewPresentation(PresentationDescriptor),
    /// Always the last event a session raises
    SessionClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub kind: MediaEventKind,
    /// Failure reported alongside the event, if any
    pub error: Option<String>,
}

impl MediaEvent {
    pub fn ok(kind: MediaEventKind) -> Self {
        Self { kind, error: None }
    }

    pub fn failed(kind: MediaEventKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: Some(error.into()),
        }
    }
}

/// Where `MediaSession::start` begins rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Resume from wherever the clock stands
    Current,
    /// Restart from time zero
    Zero,
}

pub trait PresentationClock: Send + 'static {
    fn time(&self) -> Result<Duration, NativeError>;
}

/// Per-channel linear output levels (`0.0..=1.0`).
pub trait AudioStreamVolume: Send + 'static {
    fn channel_count(&self) -> Result<u32, NativeError>;
    fn set_channel_volume(&self, channel: u32, level: f32) -> Result<(), NativeError>;
}

pub trait MediaSession: Send + 'static {
    type Source: MediaSource;
    type Clock: PresentationClock;
    type Volume: AudioStreamVolume;

    /// Arm `callback` for exactly one upcoming event. Arming twice without
    /// an intervening delivery is an invalid request.
    fn begin_get_event(&self, callback: Arc<dyn AsyncCallback>) -> Result<(), NativeError>;
    fn end_get_event(&self, result: AsyncResult) -> Result<MediaEvent, NativeError>;

    /// Queue a topology; answered by `TopologyStatus(Ready)`.
    fn set_topology(&self, topology: Topology<Self::Source>) -> Result<(), NativeError>;

    fn start(&self, position: StartPosition) -> Result<(), NativeError>;
    fn pause(&self) -> Result<(), NativeError>;
    fn stop(&self) -> Result<(), NativeError>;

    /// Asynchronous; answered by `SessionClosed`.
    fn close(&self) -> Result<(), NativeError>;
    /// Synchronous; raises no events.
    fn shutdown(&self) -> Result<(), NativeError>;

    fn clock(&self) -> Result<Self::Clock, NativeError>;
    fn stream_volume(&self) -> Result<Self::Volume, NativeError>;
}

pub trait SourceResolver: Send + 'static {
    type Source: MediaSource;
    type Cookie: Send + 'static;

    fn begin_create_object_from_url(
        &self,
        url: &str,
        callback: Arc<dyn AsyncCallback>,
    ) -> Result<Self::Cookie, NativeError>;

    fn end_create_object_from_url(
        &self,
        result: AsyncResult,
    ) -> Result<Arc<Self::Source>, NativeError>;

    fn cancel_object_creation(&self, cookie: Self::Cookie) -> Result<(), NativeError>;
}

pub trait SessionPlatform: Send + Sync + 'static {
    type Source: MediaSource;
    type Session: MediaSession<Source = Self::Source>;
    type Resolver: SourceResolver<Source = Self::Source>;

    fn create_session(&self) -> Result<Self::Session, NativeError>;
    fn create_source_resolver(&self) -> Result<Self::Resolver, NativeError>;
}
