//! Pluggable media-playback engine.
//!
//! A [`player::Player`] opens a remote audio URL on one of several
//! interchangeable backends and drives it through a shared state machine.

pub mod error;
pub mod logging;
pub mod platform;
pub mod player;
pub mod settings;

pub use error::{NativeError, PlayerError};
pub use player::{PlaybackState, Player};
pub use settings::EngineSettings;
