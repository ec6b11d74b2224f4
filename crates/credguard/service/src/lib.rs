//! Credguard compliance service.
//!
//! Owns the consent-gated lifecycle of compliance checking for automated
//! credential rotation. While enabled it analyzes a site's terms of service
//! into a cached rule set, validates proposed actions against it and records
//! every consent change, rule-set update and decision on a signed evidence
//! chain.
//!
//! ```text
//!   validate_action ─┬─► RuleCache ──miss──► DocumentRetriever ─► ComplianceAnalyzer
//!                    ├─► RuleValidator (+ RateLimiter)
//!                    └─► EvidenceLedger (best effort, reported as AuditStatus)
//! ```
//!
//! The service is an ordinary owned value built with
//! [`ComplianceService::builder`]; there is no global state.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod capability;
pub mod config;
mod error;
mod service;
pub mod status;

pub use capability::{
    CapabilityError, CapabilityResult, ComplianceAnalyzer, DiscoveredUrl, DocumentRetriever,
};
pub use config::{RateLimitConfig, ServiceConfig};
pub use error::{ComplianceError, ComplianceResult};
pub use service::{
    AnalysisOutcome, ComplianceService, ComplianceServiceBuilder, DisableReport, RuleSetSource,
};
pub use status::{OutcomeCounts, ServiceState, ServiceStats, ServiceStatus};
