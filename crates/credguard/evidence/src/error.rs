use thiserror::Error;

/// Result type for evidence chain operations.
pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// Evidence chain errors.
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence entry not found: {0}")]
    NotFound(String),

    #[error("evidence chain is empty")]
    EmptyChain,

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
