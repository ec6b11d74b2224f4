//! Status and statistics reporting

use crate::config::ServiceConfig;
use chrono::{DateTime, Utc};
use credguard_types::ValidationOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enablement state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Disabled,
    Enabled,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
        }
    }
}

/// Validation counts per outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub allowed: u64,
    pub blocked: u64,
    pub requires_human_intervention: u64,
    pub unknown: u64,
    pub disabled: u64,
}

impl OutcomeCounts {
    pub fn increment(&mut self, outcome: ValidationOutcome) {
        match outcome {
            ValidationOutcome::Allowed => self.allowed += 1,
            ValidationOutcome::Blocked => self.blocked += 1,
            ValidationOutcome::RequiresHumanIntervention => self.requires_human_intervention += 1,
            ValidationOutcome::Unknown => self.unknown += 1,
            ValidationOutcome::Disabled => self.disabled += 1,
        }
    }

    pub fn get(&self, outcome: ValidationOutcome) -> u64 {
        match outcome {
            ValidationOutcome::Allowed => self.allowed,
            ValidationOutcome::Blocked => self.blocked,
            ValidationOutcome::RequiresHumanIntervention => self.requires_human_intervention,
            ValidationOutcome::Unknown => self.unknown,
            ValidationOutcome::Disabled => self.disabled,
        }
    }

    pub fn total(&self) -> u64 {
        self.allowed + self.blocked + self.requires_human_intervention + self.unknown + self.disabled
    }
}

/// Running counters kept by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Fresh document analyses that produced a stored rule set
    pub analyses: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub validations: u64,
    pub outcomes: OutcomeCounts,
    /// Best-effort evidence appends that failed
    pub audit_failures: u64,
    /// Actions downgraded because their rate window was full
    pub rate_limited: u64,
}

/// Snapshot of the service for external reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub eula_version: Option<String>,
    pub enabled_at: Option<DateTime<Utc>>,
    pub config: ServiceConfig,
    pub stats: ServiceStats,
    pub cache_size: usize,
    pub chain_length: usize,
    pub analyzer_available: bool,
    pub analyzer_model_version: Option<String>,
    pub analyzer_model_path: Option<String>,
    /// Hex-encoded key an outside party needs to verify exports
    pub public_key: String,
}
