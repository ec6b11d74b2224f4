//! Proposed actions and validation results

use crate::rule_set::{Recommendation, RuleCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An automation step a caller wants to perform against a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// Free-form action kind, e.g. `password_rotation`. Also the rate-limit key.
    pub action_type: String,
    pub category: RuleCategory,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProposedAction {
    pub fn new(action_type: impl Into<String>, category: RuleCategory) -> Self {
        Self {
            action_type: action_type.into(),
            category,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Short human-readable form used in evidence entries.
    pub fn summary(&self) -> String {
        match &self.description {
            Some(description) => format!("{}: {}", self.action_type, description),
            None => self.action_type.clone(),
        }
    }
}

/// Outcome of validating a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Allowed,
    Blocked,
    RequiresHumanIntervention,
    Unknown,
    /// Compliance checking is switched off; no decision was made.
    Disabled,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
            Self::RequiresHumanIntervention => "requires_human_intervention",
            Self::Unknown => "unknown",
            Self::Disabled => "disabled",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl From<Recommendation> for ValidationOutcome {
    fn from(value: Recommendation) -> Self {
        match value {
            Recommendation::Allowed => Self::Allowed,
            Recommendation::Blocked => Self::Blocked,
            Recommendation::RequiresHumanIntervention => Self::RequiresHumanIntervention,
            Recommendation::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller should carry out the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    /// Fully automated (API or scripted flow).
    Automated,
    /// Automation prepares the change, a human completes or approves it.
    Assisted,
    /// A human performs the action.
    Manual,
}

impl fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Automated => "automated",
            Self::Assisted => "assisted",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Whether the evidence record for a decision made it onto the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditStatus {
    /// Not yet submitted.
    #[default]
    Pending,
    Recorded {
        entry_id: String,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl AuditStatus {
    pub fn entry_id(&self) -> Option<&str> {
        match self {
            Self::Recorded { entry_id } => Some(entry_id),
            _ => None,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

/// Decision returned for a proposed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub site: String,
    pub outcome: ValidationOutcome,
    pub method: ExecutionMethod,
    /// Rules that were evaluated as applicable to the action.
    pub applied_rule_ids: Vec<String>,
    pub reasoning: String,
    pub rule_set_id: Option<String>,
    /// Identifier of the evidence entry, once logged.
    pub evidence_id: Option<String>,
    #[serde(default)]
    pub audit: AuditStatus,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Result handed back while compliance checking is disabled.
    pub fn disabled(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            outcome: ValidationOutcome::Disabled,
            method: ExecutionMethod::Manual,
            applied_rule_ids: Vec::new(),
            reasoning: "compliance checking is disabled".to_string(),
            rule_set_id: None,
            evidence_id: None,
            audit: AuditStatus::Skipped {
                reason: "service disabled".to_string(),
            },
            validated_at: Utc::now(),
        }
    }

    /// Attach the audit outcome, filling `evidence_id` when recorded.
    pub fn with_audit(mut self, audit: AuditStatus) -> Self {
        self.evidence_id = audit.entry_id().map(str::to_string);
        self.audit = audit;
        self
    }
}
