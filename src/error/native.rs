//! Failure codes raised by the media platform layer

use reqwest::StatusCode;

/// Error type returned by every platform (graph / session / source) call.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// The object is not in a state that accepts this request
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// An async result was handed to the wrong `end_*` call
    #[error("async result carries an unexpected payload type")]
    InvalidType,

    /// The control is not available yet (no active topology)
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),

    /// The object was shut down and no longer accepts calls
    #[error("object has been shut down")]
    Shutdown,

    /// No renderer exists for the requested stream
    #[error("cannot render stream: {0}")]
    CannotRender(String),

    /// The fetched bytes are not a container we can read
    #[error("unsupported byte stream: {0}")]
    UnsupportedByteStream(String),

    /// Transport level failure (DNS, connect, timeout, body)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a failure status
    #[error("HTTP {status}: {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decoder refused the stream
    #[error("decoder error: {0}")]
    Decoder(String),

    /// The audio output device could not be opened
    #[error("audio output unavailable: {0}")]
    Output(String),

    /// The operation was cancelled before it completed
    #[error("operation cancelled")]
    Cancelled,

    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl NativeError {
    /// Whether the failure came from the network side of source resolution.
    pub fn is_network(&self) -> bool {
        matches!(self, NativeError::Network(_) | NativeError::HttpStatus { .. })
    }
}
