//! CLI level errors

use super::PlayerError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("player error: {0}")]
    Player(#[from] PlayerError),

    #[error("{0}")]
    Other(String),
}
