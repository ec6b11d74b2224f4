//! External capabilities the service drives: document retrieval and
//! compliance analysis. Both may block on I/O; the service bounds every call
//! with the operation's deadline and drops the future when it passes.

use async_trait::async_trait;
use credguard_types::RuleSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CapabilityResult<T> = Result<T, CapabilityError>;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability unavailable")]
    Unavailable,

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("capability configuration rejected: {0}")]
    Config(String),
}

/// Turns terms-of-service text into a structured rule set.
#[async_trait]
pub trait ComplianceAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str, site: &str, url: &str) -> CapabilityResult<RuleSet>;

    async fn is_available(&self) -> bool;

    fn model_version(&self) -> Option<String>;

    fn model_path(&self) -> Option<String>;

    /// Point the analyzer at a different model for future analyses.
    fn set_model_path(&self, _path: Option<&str>) -> CapabilityResult<()> {
        Ok(())
    }
}

/// Result of terms-of-service URL discovery.
///
/// `url` always carries a best-effort guess. A set `error` means no candidate
/// was confirmed and the guess is unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub error: Option<String>,
}

impl DiscoveredUrl {
    pub fn found(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: None,
        }
    }

    pub fn guessed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: Some(error.into()),
        }
    }
}

/// Fetches documents and locates a site's terms of service.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn fetch(&self, url: &str) -> CapabilityResult<String>;

    async fn discover(&self, site: &str) -> DiscoveredUrl;
}
