use thiserror::Error;

/// Result type for rule cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Rule cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("invalid site: {0}")]
    InvalidSite(String),

    #[error("invalid ttl: {0}")]
    InvalidTtl(String),

    #[error("backend error: {0}")]
    Backend(String),
}
