//! Evidence chain entries

use crate::validation::ValidationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of event recorded on the evidence chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceEventType {
    Enabled,
    Disabled,
    RuleSetUpdated,
    Validation,
}

impl EvidenceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::RuleSetUpdated => "rule_set_updated",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for EvidenceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable, signed, hash-linked evidence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EvidenceEventType,
    pub site: String,
    /// One-way hash of the credential identifier; empty for non-credential events.
    pub credential_hash: String,
    pub action: Option<String>,
    pub validation_result: Option<ValidationOutcome>,
    /// Referenced rule set, or empty.
    pub rule_set_id: String,
    pub applied_rule_ids: Vec<String>,
    /// Serialized JSON payload.
    pub payload: String,
    /// Identifier of the preceding entry; empty for the first entry.
    pub previous_id: String,
    pub chain_hash: String,
    /// Hex-encoded Ed25519 signature over the canonical encoding.
    pub signature: String,
}

impl EvidenceEntry {
    pub fn is_genesis(&self) -> bool {
        self.previous_id.is_empty()
    }

    /// Validation outcome as it appears in the canonical encoding.
    pub fn validation_result_str(&self) -> &'static str {
        self.validation_result
            .as_ref()
            .map(ValidationOutcome::as_str)
            .unwrap_or("")
    }
}
