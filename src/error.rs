use thiserror::Error;

/// The single error type returned by every fallible entry point in this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("overflow: adjusted weight sum is not finite ({advice})")]
    Overflow { advice: &'static str },

    #[error("parse error at byte offset {offset}: {reason}")]
    ParseError { offset: usize, reason: String },

    #[error("interrupted")]
    Interrupted,

    /// Internal signal raised inside a worker thread when another worker has
    /// already set the shared abort flag. Never escapes the orchestrator: it is
    /// absorbed at the pool boundary and the first real error is re-raised.
    #[error("thread aborted")]
    ThreadAborted,
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn parse_error(offset: usize, reason: impl Into<String>) -> Self {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
