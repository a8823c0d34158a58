use std::panic::Location;
use thiserror::Error;

pub type Result<T, E = ProbeError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("malformed probe data: {0}")]
    Malformed(String),
    #[error("invariant violated at {location}: {message}")]
    InvariantViolation {
        message: String,
        location: &'static Location<'static>,
    },
}

impl ProbeError {
    /// Builds an invariant violation tagged with the caller's source location.
    #[track_caller]
    pub fn invariant(message: impl Into<String>) -> Self {
        ProbeError::InvariantViolation {
            message: message.into(),
            location: Location::caller(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProbeError::Unavailable(_))
    }
}
