use thiserror::Error;

/// Result type for validator operations.
pub type ValidatorResult<T> = Result<T, ValidatorError>;

/// Validator errors.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    #[error("rate limiter backend error: {0}")]
    Backend(String),
}
