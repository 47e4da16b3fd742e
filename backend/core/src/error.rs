use thiserror::Error;

/// Top-level error type for the SlipGuard runtime.
#[derive(Debug, Error)]
pub enum SlipError {
    #[error("invalid extraction pattern: {0}")]
    InvalidPattern(String),

    #[error("learning record for issuer {0} is missing a tenant id")]
    MissingTenant(String),

    #[error("vision provider error: {message}")]
    Provider { message: String },

    #[error("vision provider timed out after {0} seconds")]
    ProviderTimeout(u64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
