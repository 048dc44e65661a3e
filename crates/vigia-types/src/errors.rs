use thiserror::Error;

pub type Result<T, E = VigiaError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum VigiaError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("enrollment error: {0}")]
    Enrollment(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
