use thiserror::Error;

pub type Result<T, E = TelemetryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("sampling period must be non-zero")]
    InvalidPeriod,
    #[error("timer unavailable: {0}")]
    TimerUnavailable(String),
    #[error("cannot {op} a sampler that is {state}")]
    InvalidState { op: &'static str, state: &'static str },
    #[error("metric source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("metric source read failed: {0}")]
    Read(String),
}
