//! Backend-agnostic playback engine.
//!
//! [`Player`] is the public surface: it picks a backend once through the
//! [`registry`], then forwards every call to it and folds the result into
//! `bool` / seconds. Error detail goes to the log, not to the caller.

pub mod backend;
pub mod graph;
pub mod mixer;
pub mod registry;
pub mod session;
pub mod state;
pub mod topology;

pub use backend::{BackendOptions, PlayerBackend};
pub use graph::GraphPlayer;
pub use mixer::VolumeSetting;
pub use registry::{BACKENDS, BackendDescriptor, select_backend};
pub use session::SessionPlayer;
pub use state::{PlaybackState, StateMachine, Transition};

use crate::error::PlayerError;
use crate::settings::EngineSettings;

pub struct Player {
    descriptor: BackendDescriptor,
    backend: Box<dyn PlayerBackend>,
}

impl Player {
    /// Select a backend from the built-in table.
    pub fn init(settings: &EngineSettings) -> Result<Self, PlayerError> {
        Self::with_backends(BACKENDS, settings)
    }

    pub fn with_backends(
        table: &[BackendDescriptor],
        settings: &EngineSettings,
    ) -> Result<Self, PlayerError> {
        let (descriptor, mut backend) =
            select_backend(table, settings.backend.as_deref(), settings)?;
        backend.set_volume(settings.volume);
        backend.set_gain(settings.gain_db);
        Ok(Self {
            descriptor,
            backend,
        })
    }

    pub fn backend_id(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn backend_name(&self) -> &'static str {
        self.descriptor.name
    }

    fn report(&self, op: &'static str, result: Result<(), PlayerError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) if e.is_invalid_request() => {
                tracing::debug!(backend = self.descriptor.id, op, err = %e, "request rejected");
                false
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(backend = self.descriptor.id, op, err = %e, "player unusable");
                false
            }
            Err(e) => {
                tracing::warn!(backend = self.descriptor.id, op, err = %e, "request failed");
                false
            }
        }
    }

    pub fn open(&mut self, url: &str) -> bool {
        let result = self.backend.open(url);
        self.report("open", result)
    }

    pub fn play(&mut self) -> bool {
        let result = self.backend.play();
        self.report("play", result)
    }

    pub fn pause(&mut self) -> bool {
        let result = self.backend.pause();
        self.report("pause", result)
    }

    pub fn stop(&mut self) -> bool {
        let result = self.backend.stop();
        self.report("stop", result)
    }

    pub fn finish(&mut self) -> bool {
        let result = self.backend.finish();
        self.report("finish", result)
    }

    /// Linear master volume, clamped to `0.0..=1.0`.
    pub fn set_volume(&mut self, volume: f32) {
        self.backend.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.backend.volume()
    }

    /// Replay gain in dB.
    pub fn set_gain(&mut self, gain_db: f32) {
        self.backend.set_gain(gain_db);
    }

    pub fn gain(&self) -> f32 {
        self.backend.gain()
    }

    /// Seconds; 0 when unknown.
    pub fn duration(&self) -> f64 {
        self.backend.duration().as_secs_f64()
    }

    /// Seconds; 0 when no clock is running.
    pub fn time(&self) -> f64 {
        self.backend.time().as_secs_f64()
    }

    pub fn state(&self) -> PlaybackState {
        self.backend.state()
    }

    pub fn is_playing(&self) -> bool {
        self.backend.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.backend.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.backend.is_stopped()
    }

    pub fn is_finished(&self) -> bool {
        self.backend.is_finished()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        tracing::debug!(backend = self.descriptor.id, state = %self.backend.state(), "destroying player");
    }
}
