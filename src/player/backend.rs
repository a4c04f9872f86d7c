use std::time::Duration;

use super::state::PlaybackState;
use crate::error::PlayerError;

/// Tunables shared by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// How long a close waits for the platform's acknowledgement
    pub close_timeout: Duration,
    /// Slack allowed when comparing position against an estimated duration
    pub finish_tolerance: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_millis(5000),
            finish_tolerance: Duration::from_millis(200),
        }
    }
}

/// Contract every backend adapter implements.
///
/// Dropping the adapter is `Destroy`: it tears the session down and waits
/// for the platform to acknowledge, like `finish` does.
pub trait PlayerBackend: Send {
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;
    fn set_gain(&mut self, gain_db: f32);
    fn gain(&self) -> f32;

    /// Zero when unknown or when nothing is open.
    fn duration(&self) -> Duration;
    /// Zero when no clock is running.
    fn time(&self) -> Duration;

    /// Tear down whatever is open and start opening `url`. May return while
    /// the state is still `OpenPending`.
    fn open(&mut self, url: &str) -> Result<(), PlayerError>;
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self) -> Result<(), PlayerError>;
    fn stop(&mut self) -> Result<(), PlayerError>;
    /// Tear the session down unconditionally.
    fn finish(&mut self) -> Result<(), PlayerError>;

    fn state(&self) -> PlaybackState;

    fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Started
    }

    fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    fn is_stopped(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    fn is_finished(&self) -> bool;
}
