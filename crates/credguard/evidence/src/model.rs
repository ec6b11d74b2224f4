//! Append requests, export filters and verification reports.

use chrono::{DateTime, Utc};
use credguard_types::{
    hash_credential_id, EvidenceEntry, EvidenceEventType, ValidationOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Evidence append payload. Identifier, timestamp, links and signature are
/// assigned by the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
    pub event_type: EvidenceEventType,
    pub site: String,
    pub credential_hash: String,
    pub action: Option<String>,
    pub validation_result: Option<ValidationOutcome>,
    pub rule_set_id: String,
    pub applied_rule_ids: Vec<String>,
    #[serde(default)]
    pub payload: Value,
}

impl NewEvidence {
    pub fn new(event_type: EvidenceEventType) -> Self {
        Self {
            event_type,
            site: String::new(),
            credential_hash: String::new(),
            action: None,
            validation_result: None,
            rule_set_id: String::new(),
            applied_rule_ids: Vec::new(),
            payload: Value::Null,
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    /// Attach an already-hashed credential identifier.
    pub fn with_credential_hash(mut self, credential_hash: impl Into<String>) -> Self {
        self.credential_hash = credential_hash.into();
        self
    }

    /// Hash a raw credential identifier and attach the digest.
    pub fn with_credential_id(self, raw_credential_id: &str) -> Self {
        self.with_credential_hash(hash_credential_id(raw_credential_id))
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_validation_result(mut self, outcome: ValidationOutcome) -> Self {
        self.validation_result = Some(outcome);
        self
    }

    pub fn with_rule_set_id(mut self, rule_set_id: impl Into<String>) -> Self {
        self.rule_set_id = rule_set_id.into();
        self
    }

    pub fn with_applied_rule_ids(mut self, rule_ids: Vec<String>) -> Self {
        self.applied_rule_ids = rule_ids;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Export filter. Unset fields match everything; time bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportFilter {
    pub credential_hash: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ExportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_credential_hash(credential_hash: impl Into<String>) -> Self {
        Self {
            credential_hash: Some(credential_hash.into()),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn matches(&self, entry: &EvidenceEntry) -> bool {
        if let Some(hash) = self.credential_hash.as_deref().filter(|h| !h.is_empty()) {
            if entry.credential_hash != hash {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Snapshot of the chain for an independent verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExport {
    /// Hex-encoded Ed25519 public key of the chain's signer.
    pub public_key: String,
    pub entries: Vec<EvidenceEntry>,
    pub entry_count: usize,
    pub exported_at: DateTime<Utc>,
}

/// Outcome of walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: usize,
    pub errors: Vec<String>,
}

impl ChainVerification {
    pub fn ok(entries_checked: usize) -> Self {
        Self {
            valid: true,
            entries_checked,
            errors: Vec::new(),
        }
    }

    pub fn failed(entries_checked: usize, errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            entries_checked,
            errors,
        }
    }

    /// `(all_valid, errors)` form.
    pub fn into_parts(self) -> (bool, Vec<String>) {
        (self.valid, self.errors)
    }
}
