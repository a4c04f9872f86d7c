//! Structured error types for every layer of the engine.

mod app;
mod native;
mod player;

pub use app::AppError;
pub use native::NativeError;
pub use player::PlayerError;
