//! Compliance rule sets
//!
//! A [`RuleSet`] is the structured reading of one site's terms of service.
//! Rules have no identity outside their parent rule set.

use crate::hashing::derive_rule_set_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall recommendation carried by a rule set or derived from its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Allowed,
    Blocked,
    RequiresHumanIntervention,
    #[default]
    Unknown,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
            Self::RequiresHumanIntervention => "requires_human_intervention",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What part of a site's terms a rule speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    ApiUsage,
    RateLimits,
    Automation,
    AccountSecurity,
    PasswordChange,
    DataAccess,
    /// Applies to every proposed action regardless of its category.
    General,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiUsage => "api_usage",
            Self::RateLimits => "rate_limits",
            Self::Automation => "automation",
            Self::AccountSecurity => "account_security",
            Self::PasswordChange => "password_change",
            Self::DataAccess => "data_access",
            Self::General => "general",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly a rule constrains automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    /// Explicitly permits the behaviour.
    Permitted,
    /// Informational only; does not restrict.
    Informational,
    /// Allowed only with a human in the loop.
    Restricted,
    /// Forbids the behaviour.
    Prohibited,
    /// The analyzer could not classify the clause.
    Unknown,
}

impl RuleSeverity {
    /// Verdict this severity contributes on its own.
    ///
    /// `Unknown` maps to [`Recommendation::Unknown`]; the validator resolves
    /// it to the configured default-on-uncertain outcome.
    pub fn verdict(&self) -> Recommendation {
        match self {
            Self::Permitted | Self::Informational => Recommendation::Allowed,
            Self::Restricted => Recommendation::RequiresHumanIntervention,
            Self::Prohibited => Recommendation::Blocked,
            Self::Unknown => Recommendation::Unknown,
        }
    }
}

/// One clause of a site's terms of service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub category: RuleCategory,
    pub severity: RuleSeverity,
    pub text: String,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        category: RuleCategory,
        severity: RuleSeverity,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            severity,
            text: text.into(),
        }
    }
}

/// Cached compliance rule set for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Content-derived identifier; empty until derived by the cache.
    #[serde(default)]
    pub id: String,
    pub site: String,
    pub document_version: String,
    pub document_hash: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub rules: Vec<Rule>,
    pub recommendation: Recommendation,
    pub reasoning: String,
    pub parsed_at: DateTime<Utc>,
    /// Owned by the cache: overwritten on every store.
    pub expires_at: DateTime<Utc>,
    /// Optional signature over the source document.
    #[serde(default)]
    pub document_signature: Option<String>,
}

impl RuleSet {
    /// Create an empty rule set parsed now.
    pub fn new(
        site: impl Into<String>,
        document_version: impl Into<String>,
        document_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            site: site.into(),
            document_version: document_version.into(),
            document_hash: document_hash.into(),
            source_url: None,
            rules: Vec::new(),
            recommendation: Recommendation::Unknown,
            reasoning: String::new(),
            parsed_at: now,
            expires_at: now,
            document_signature: None,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = recommendation;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Identifier derived from site, document version and document hash.
    pub fn content_id(&self) -> String {
        derive_rule_set_id(&self.site, &self.document_version, &self.document_hash)
    }

    /// Whether this rule set has passed its own expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether this rule set has passed its own expiry by wall-clock time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn severity_verdicts() {
        assert_eq!(RuleSeverity::Permitted.verdict(), Recommendation::Allowed);
        assert_eq!(RuleSeverity::Informational.verdict(), Recommendation::Allowed);
        assert_eq!(
            RuleSeverity::Restricted.verdict(),
            Recommendation::RequiresHumanIntervention
        );
        assert_eq!(RuleSeverity::Prohibited.verdict(), Recommendation::Blocked);
        assert_eq!(RuleSeverity::Unknown.verdict(), Recommendation::Unknown);
    }

    #[test]
    fn expiry_is_strictly_after() {
        let mut rule_set = RuleSet::new("example.com", "v1", "h1");
        let expiry = Utc::now();
        rule_set.expires_at = expiry;
        assert!(!rule_set.is_expired_at(expiry));
        assert!(rule_set.is_expired_at(expiry + Duration::milliseconds(1)));
        assert!(!rule_set.is_expired_at(expiry - Duration::seconds(1)));
    }

    #[test]
    fn content_id_ignores_rules() {
        let bare = RuleSet::new("example.com", "v1", "h1");
        let ruled = RuleSet::new("example.com", "v1", "h1").with_rule(Rule::new(
            "r1",
            RuleCategory::Automation,
            RuleSeverity::Prohibited,
            "no bots",
        ));
        assert_eq!(bare.content_id(), ruled.content_id());
        assert_eq!(ruled.rule_count(), 1);
    }

    #[test]
    fn recommendation_serializes_snake_case() {
        let json = serde_json::to_string(&Recommendation::RequiresHumanIntervention).unwrap();
        assert_eq!(json, "\"requires_human_intervention\"");
        assert_eq!(Recommendation::default(), Recommendation::Unknown);
    }
}
