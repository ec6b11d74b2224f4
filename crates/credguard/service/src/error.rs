use crate::capability::CapabilityError;
use credguard_cache::CacheError;
use credguard_evidence::EvidenceError;
use credguard_validator::ValidatorError;
use thiserror::Error;

/// Result type for compliance service operations.
pub type ComplianceResult<T> = Result<T, ComplianceError>;

/// Compliance service errors.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("compliance checking is not enabled")]
    NotEnabled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("compliance analyzer is unavailable")]
    AnalyzerUnavailable,

    #[error("document retrieval failed: {0}")]
    Fetch(String),

    #[error("compliance analysis failed: {0}")]
    Analysis(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("evidence verification failed: {}", .0.join("; "))]
    CryptographicMismatch(Vec<String>),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("consent required: {0}")]
    ConsentRequired(String),

    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: &'static str, after_ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<CacheError> for ComplianceError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidRuleSet(msg) | CacheError::InvalidSite(msg) => Self::Validation(msg),
            CacheError::InvalidTtl(msg) => Self::Config(msg),
            CacheError::Backend(msg) => Self::Persistence(msg),
        }
    }
}

impl From<EvidenceError> for ComplianceError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::NotFound(id) => Self::NotFound(format!("evidence entry {}", id)),
            EvidenceError::EmptyChain => Self::NotFound("evidence chain is empty".to_string()),
            EvidenceError::InvalidKey(msg) => Self::CryptographicMismatch(vec![msg]),
            EvidenceError::Serialization(msg) | EvidenceError::Backend(msg) => {
                Self::Persistence(msg)
            }
        }
    }
}

impl From<ValidatorError> for ComplianceError {
    fn from(err: ValidatorError) -> Self {
        match err {
            ValidatorError::InvalidRuleSet(msg) | ValidatorError::InvalidAction(msg) => {
                Self::Validation(msg)
            }
            ValidatorError::InvalidPolicy(msg) => Self::Config(msg),
            ValidatorError::Backend(msg) => Self::Persistence(msg),
        }
    }
}

impl From<CapabilityError> for ComplianceError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Unavailable => Self::AnalyzerUnavailable,
            CapabilityError::Fetch(msg) => Self::Fetch(msg),
            CapabilityError::Analysis(msg) => Self::Analysis(msg),
            CapabilityError::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<config::ConfigError> for ComplianceError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
