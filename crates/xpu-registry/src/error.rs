use std::panic::Location;
use thiserror::Error;
use tracing::error;
use xpu_probe::{DeviceKind, Identity, ProbeError};

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),
    #[error("device {identity} reported as {incoming} but registered as {existing}")]
    KindConflict {
        identity: Identity,
        existing: DeviceKind,
        incoming: DeviceKind,
    },
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("invariant violated at {location}: {message}")]
    InvariantViolation {
        message: String,
        location: &'static Location<'static>,
    },
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

impl RegistryError {
    #[track_caller]
    pub fn invariant(message: impl Into<String>) -> Self {
        RegistryError::InvariantViolation {
            message: message.into(),
            location: Location::caller(),
        }
    }
}

/// Decides what happens to structural violations found while assembling a registry.
///
/// Returning `Err` aborts construction with that error. Returning `Ok` drops the
/// offending input and lets assembly continue.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: RegistryError) -> Result<()>;
}

/// Default handler: every violation aborts.
#[derive(Debug, Default, Clone, Copy)]
pub struct RaiseError;

impl ErrorHandler for RaiseError {
    fn handle(&self, error: RegistryError) -> Result<()> {
        Err(error)
    }
}

/// Logs the violation and keeps going.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndContinue;

impl ErrorHandler for LogAndContinue {
    fn handle(&self, err: RegistryError) -> Result<()> {
        error!(error = %err, "registry: ignoring structural violation");
        Ok(())
    }
}
