//! Playback engine errors

use std::time::Duration;

use super::NativeError;
use crate::platform::MajorType;
use crate::player::PlaybackState;

/// Error taxonomy of the playback engine.
///
/// Everything collapses to `bool` at the [`crate::player::Player`] boundary;
/// the variants exist so adapters can decide between "reject", "tear down"
/// and "give up on this instance".
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// No registered backend could be constructed
    #[error("no playback backend available")]
    NoBackendAvailable,

    /// A single backend failed to construct during selection
    #[error("backend {id} failed to initialize: {source}")]
    BackendInit {
        id: &'static str,
        #[source]
        source: NativeError,
    },

    /// The call is not valid in the current state; nothing was changed
    #[error("{op} is not valid while {state}")]
    InvalidRequest {
        op: &'static str,
        state: PlaybackState,
    },

    #[error("empty url")]
    EmptyUrl,

    /// A selected stream has no renderer (only audio is supported)
    #[error("stream {index} has unsupported major type {major:?}")]
    UnsupportedStream { index: usize, major: MajorType },

    /// The topology was built but no branch ended up connected
    #[error("topology has no connected branch")]
    NoConnectedBranches,

    /// A platform call failed
    #[error(transparent)]
    Native(#[from] NativeError),

    /// The session never acknowledged close; the instance is unusable
    #[error("session did not acknowledge close within {0:?}")]
    CloseTimeout(Duration),

    /// A previous close timed out; native state can no longer be trusted
    #[error("player is unresponsive after a close timeout")]
    Unresponsive,
}

impl PlayerError {
    pub fn invalid(op: &'static str, state: PlaybackState) -> Self {
        PlayerError::InvalidRequest { op, state }
    }

    /// Rejected without touching state; the caller may simply not retry.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, PlayerError::InvalidRequest { .. })
    }

    /// The instance (or the whole engine) cannot be used any further.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlayerError::NoBackendAvailable
                | PlayerError::CloseTimeout(_)
                | PlayerError::Unresponsive
        )
    }
}
