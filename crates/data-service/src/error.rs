//! Error types for operations

/// Failure categories an operation can settle with.
///
/// `Interrupted` only ever classifies a failure: an interrupted call is
/// delivered to the cancel channel, never to error subscribers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is the interruption marker raised by a cancelled token.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Result alias for operation plumbing.
pub type Result<T> = std::result::Result<T, Error>;
