//! Rule evaluation
//!
//! Applicable rules are combined most-restrictive-wins:
//! Blocked > RequiresHumanIntervention > uncertain > Allowed. Uncertainty,
//! including the absence of any applicable rule, resolves to the configured
//! default rather than to Allowed.

use crate::rate_limit::{InMemoryRateLimiter, RateLimiter};
use crate::{ValidatorError, ValidatorResult};
use chrono::Utc;
use credguard_types::{
    AuditStatus, ExecutionMethod, ProposedAction, Recommendation, Rule, RuleCategory, RuleSet,
    ValidationOutcome, ValidationResult,
};
use std::sync::Arc;

/// Evaluates proposed actions against a site's rule set.
#[derive(Clone)]
pub struct RuleValidator {
    default_on_uncertain: Recommendation,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl RuleValidator {
    pub fn new(default_on_uncertain: Recommendation, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            default_on_uncertain,
            rate_limiter,
        }
    }

    pub fn default_on_uncertain(&self) -> Recommendation {
        self.default_on_uncertain
    }

    /// Copy of this validator with a different fallback for uncertain cases.
    pub fn with_default_on_uncertain(&self, default_on_uncertain: Recommendation) -> Self {
        Self {
            default_on_uncertain,
            rate_limiter: Arc::clone(&self.rate_limiter),
        }
    }

    pub fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    /// Rules whose category matches the action's. `General` rules apply to
    /// every action.
    pub fn get_applicable_rules<'a>(
        &self,
        rule_set: &'a RuleSet,
        action: &ProposedAction,
    ) -> Vec<&'a Rule> {
        rule_set
            .rules
            .iter()
            .filter(|rule| rule.category == action.category || rule.category == RuleCategory::General)
            .collect()
    }

    /// Combine per-rule verdicts into one outcome.
    pub fn determine_recommendation(&self, rules: &[&Rule]) -> ValidationOutcome {
        if rules.is_empty() {
            return self.default_on_uncertain.into();
        }

        let verdicts: Vec<Recommendation> = rules.iter().map(|rule| rule.severity.verdict()).collect();

        if verdicts.contains(&Recommendation::Blocked) {
            ValidationOutcome::Blocked
        } else if verdicts.contains(&Recommendation::RequiresHumanIntervention) {
            ValidationOutcome::RequiresHumanIntervention
        } else if verdicts.contains(&Recommendation::Unknown) {
            self.default_on_uncertain.into()
        } else {
            ValidationOutcome::Allowed
        }
    }

    pub fn recommend_method(&self, outcome: ValidationOutcome) -> ExecutionMethod {
        match outcome {
            ValidationOutcome::Allowed => ExecutionMethod::Automated,
            ValidationOutcome::RequiresHumanIntervention => ExecutionMethod::Assisted,
            ValidationOutcome::Blocked | ValidationOutcome::Unknown | ValidationOutcome::Disabled => {
                ExecutionMethod::Manual
            }
        }
    }

    /// Evaluate `action` against `rule_set`. The returned result has no
    /// evidence attached yet.
    pub fn validate(
        &self,
        rule_set: &RuleSet,
        action: &ProposedAction,
    ) -> ValidatorResult<ValidationResult> {
        if rule_set.site.trim().is_empty() {
            return Err(ValidatorError::InvalidRuleSet(
                "rule set has no site".to_string(),
            ));
        }
        if action.action_type.trim().is_empty() {
            return Err(ValidatorError::InvalidAction(
                "action type must not be empty".to_string(),
            ));
        }

        let applicable = self.get_applicable_rules(rule_set, action);
        let outcome = self.determine_recommendation(&applicable);
        let method = self.recommend_method(outcome);
        let reasoning = explain(&applicable, action, outcome, self.default_on_uncertain);

        tracing::debug!(
            site = %rule_set.site,
            action_type = %action.action_type,
            applicable = applicable.len(),
            outcome = %outcome,
            method = %method,
            "Evaluated action"
        );

        Ok(ValidationResult {
            site: rule_set.site.clone(),
            outcome,
            method,
            applied_rule_ids: applicable.iter().map(|rule| rule.id.clone()).collect(),
            reasoning,
            rule_set_id: Some(rule_set.id.clone()).filter(|id| !id.is_empty()),
            evidence_id: None,
            audit: AuditStatus::Pending,
            validated_at: Utc::now(),
        })
    }

    /// Whether performing `action` on `site` now would exceed its window.
    pub async fn check_rate_limit(
        &self,
        site: &str,
        action: &ProposedAction,
    ) -> ValidatorResult<bool> {
        self.rate_limiter
            .would_exceed(site, &action.action_type)
            .await
    }

    pub async fn record_action(&self, site: &str, action: &ProposedAction) -> ValidatorResult<()> {
        self.rate_limiter.record(site, &action.action_type).await
    }

    /// Check and record `action` on `site` atomically. `false` means the
    /// window is full and nothing was recorded.
    pub async fn acquire_rate_slot(
        &self,
        site: &str,
        action: &ProposedAction,
    ) -> ValidatorResult<bool> {
        self.rate_limiter
            .try_acquire(site, &action.action_type)
            .await
    }
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::new(
            Recommendation::RequiresHumanIntervention,
            Arc::new(InMemoryRateLimiter::default()),
        )
    }
}

fn explain(
    applicable: &[&Rule],
    action: &ProposedAction,
    outcome: ValidationOutcome,
    default_on_uncertain: Recommendation,
) -> String {
    if applicable.is_empty() {
        return format!(
            "no rules apply to {} ({}); using default {}",
            action.action_type,
            action.category.as_str(),
            default_on_uncertain
        );
    }

    let drivers: Vec<&str> = applicable
        .iter()
        .filter(|rule| ValidationOutcome::from(rule.severity.verdict()) == outcome)
        .map(|rule| rule.id.as_str())
        .collect();

    if drivers.is_empty() {
        format!(
            "{} applicable rule(s) for {} are uncertain; using default {}",
            applicable.len(),
            action.action_type,
            default_on_uncertain
        )
    } else {
        format!(
            "{} of {} applicable rule(s) for {}: {}",
            outcome,
            applicable.len(),
            action.action_type,
            drivers.join(", ")
        )
    }
}
