//! Service configuration

use crate::{ComplianceError, ComplianceResult};
use credguard_cache::MAX_TTL;
use credguard_types::Recommendation;
use credguard_validator::RateLimitPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compliance service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Lifetime of newly cached rule sets
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Write rule-set-update and validation entries to the evidence chain
    #[serde(default = "default_true")]
    pub evidence_enabled: bool,

    /// Outcome used when applicable rules are absent or uncertain
    #[serde(default = "default_on_uncertain")]
    pub default_on_uncertain: Recommendation,

    /// Model handed to the compliance analyzer
    #[serde(default)]
    pub analyzer_model_path: Option<String>,

    /// Budget covering discovery, fetch and analysis of one document
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,

    /// Use the retriever's unconfirmed URL guess when discovery fails
    #[serde(default)]
    pub accept_discovery_fallback: bool,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Per-site, per-action-type quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_actions")]
    pub max_actions: u32,

    #[serde(default = "default_rate_window")]
    pub window_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            evidence_enabled: true,
            default_on_uncertain: default_on_uncertain(),
            analyzer_model_path: None,
            analysis_timeout_secs: default_analysis_timeout(),
            accept_discovery_fallback: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            window_secs: default_rate_window(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    30 * 24 * 60 * 60
}

fn default_on_uncertain() -> Recommendation {
    Recommendation::RequiresHumanIntervention
}

fn default_analysis_timeout() -> u64 {
    30
}

fn default_max_actions() -> u32 {
    5
}

fn default_rate_window() -> u64 {
    3600
}

impl ServiceConfig {
    /// Layer defaults, an optional file and `CREDGUARD__*` environment
    /// variables (`CREDGUARD__RATE_LIMIT__MAX_ACTIONS=10`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CREDGUARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> ComplianceResult<()> {
        if self.cache_ttl_secs == 0 {
            return Err(ComplianceError::Config(
                "cache_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.cache_ttl() > MAX_TTL {
            return Err(ComplianceError::Config(format!(
                "cache_ttl_secs {} exceeds maximum {}",
                self.cache_ttl_secs,
                MAX_TTL.as_secs()
            )));
        }
        if self.analysis_timeout_secs == 0 {
            return Err(ComplianceError::Config(
                "analysis_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ComplianceError::Config(
                "rate_limit.window_secs must be greater than zero".to_string(),
            ));
        }
        if self
            .analyzer_model_path
            .as_deref()
            .is_some_and(|path| path.trim().is_empty())
        {
            return Err(ComplianceError::Config(
                "analyzer_model_path must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn rate_limit_policy(&self) -> ComplianceResult<RateLimitPolicy> {
        Ok(RateLimitPolicy::new(
            self.rate_limit.max_actions,
            Duration::from_secs(self.rate_limit.window_secs),
        )?)
    }
}
