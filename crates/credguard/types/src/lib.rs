//! # Credguard shared types
//!
//! Data model shared by every credguard component:
//!
//! - [`RuleSet`] / [`Rule`]: the cached, structured reading of a site's terms
//!   of service (a "CRC").
//! - [`ProposedAction`] / [`ValidationResult`]: the question asked of the
//!   validator and the decision it returns.
//! - [`EvidenceEntry`]: one signed, hash-linked record of the evidence chain.
//!
//! Hashing helpers live in [`hashing`]. Raw credential identifiers are only
//! ever accepted by [`hash_credential_id`]; every other type carries the
//! one-way digest.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod evidence;
pub mod hashing;
pub mod rule_set;
pub mod validation;

pub use evidence::{EvidenceEntry, EvidenceEventType};
pub use hashing::{derive_rule_set_id, digest_hex, hash_credential_id};
pub use rule_set::{Recommendation, Rule, RuleCategory, RuleSet, RuleSeverity};
pub use validation::{
    AuditStatus, ExecutionMethod, ProposedAction, ValidationOutcome, ValidationResult,
};
