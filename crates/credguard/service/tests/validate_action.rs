mod common;

use async_trait::async_trait;
use common::{
    password_change, permissive_rules, rule, Harness, MockAnalyzer, MockRetriever, EULA,
};
use credguard_evidence::{ChainExport, ChainVerifier, ExportFilter};
use credguard_service::{ComplianceService, RateLimitConfig, ServiceConfig};
use credguard_types::{
    hash_credential_id, AuditStatus, EvidenceEventType, ExecutionMethod, ProposedAction,
    Recommendation, RuleCategory, RuleSeverity, ValidationOutcome,
};
use credguard_validator::{InMemoryRateLimiter, RateLimitPolicy, RateLimiter, ValidatorResult};
use std::sync::Arc;
use std::time::Duration;

/// In-memory limiter that suspends before every call, like a limiter backed
/// by a remote store would.
struct SuspendingRateLimiter {
    inner: InMemoryRateLimiter,
}

#[async_trait]
impl RateLimiter for SuspendingRateLimiter {
    async fn would_exceed(&self, site: &str, action_type: &str) -> ValidatorResult<bool> {
        tokio::task::yield_now().await;
        self.inner.would_exceed(site, action_type).await
    }

    async fn record(&self, site: &str, action_type: &str) -> ValidatorResult<()> {
        tokio::task::yield_now().await;
        self.inner.record(site, action_type).await
    }

    async fn try_acquire(&self, site: &str, action_type: &str) -> ValidatorResult<bool> {
        tokio::task::yield_now().await;
        self.inner.try_acquire(site, action_type).await
    }

    async fn prune_expired(&self) -> ValidatorResult<usize> {
        self.inner.prune_expired().await
    }

    fn set_policy(&self, policy: RateLimitPolicy) -> ValidatorResult<()> {
        self.inner.set_policy(policy)
    }

    fn policy(&self) -> RateLimitPolicy {
        self.inner.policy()
    }
}

#[tokio::test]
async fn disabled_service_returns_disabled_decision_without_evidence() {
    let harness = Harness::new(permissive_rules(), ServiceConfig::default());

    let result = harness
        .service
        .validate_action("example.com", &password_change(), "vault-item-1", false)
        .await
        .expect("disabled validation is not an error");
    assert_eq!(result.outcome, ValidationOutcome::Disabled);
    assert_eq!(result.method, ExecutionMethod::Manual);
    assert!(result.evidence_id.is_none());
    assert!(harness.entries().await.is_empty());
    assert_eq!(harness.analyzer.calls(), 0);

    let stats = harness.service.status().await.unwrap().stats;
    assert_eq!(stats.validations, 1);
    assert_eq!(stats.outcomes.disabled, 1);
}

#[tokio::test]
async fn prohibited_rule_blocks_and_is_recorded() {
    let rules = vec![rule(
        "no-automated-password-change",
        RuleCategory::PasswordChange,
        RuleSeverity::Prohibited,
    )];
    let harness = Harness::enabled(rules, ServiceConfig::default()).await;

    let result = harness
        .service
        .validate_action("example.com", &password_change(), "vault-item-1", false)
        .await
        .unwrap();
    assert_eq!(result.outcome, ValidationOutcome::Blocked);
    assert_eq!(result.method, ExecutionMethod::Manual);
    assert_eq!(
        result.applied_rule_ids,
        vec!["no-automated-password-change".to_string()]
    );

    let entry_id = result.evidence_id.clone().expect("decision is recorded");
    assert_eq!(result.audit.entry_id(), Some(entry_id.as_str()));

    let entries = harness.entries().await;
    let entry = entries.last().unwrap();
    assert_eq!(entry.id, entry_id);
    assert_eq!(entry.event_type, EvidenceEventType::Validation);
    assert_eq!(entry.validation_result, Some(ValidationOutcome::Blocked));
    assert_eq!(entry.action.as_deref(), Some("password_change"));
    assert_eq!(entry.applied_rule_ids, result.applied_rule_ids);
    assert_eq!(Some(entry.rule_set_id.clone()), result.rule_set_id);

    let stats = harness.service.status().await.unwrap().stats;
    assert_eq!(stats.outcomes.blocked, 1);
}

#[tokio::test]
async fn raw_credential_never_reaches_the_chain() {
    let harness = Harness::enabled(permissive_rules(), ServiceConfig::default()).await;
    harness
        .service
        .validate_action("example.com", &password_change(), "vault-item-42", false)
        .await
        .unwrap();

    let export = harness
        .service
        .export_evidence_chain(&ExportFilter::all())
        .await
        .unwrap();
    let wire = serde_json::to_string(&export).unwrap();
    assert!(!wire.contains("vault-item-42"));

    let mine = harness
        .service
        .export_evidence_chain(&ExportFilter::for_credential_hash(hash_credential_id(
            "vault-item-42",
        )))
        .await
        .unwrap();
    assert_eq!(mine.entry_count, 1);
    assert_eq!(mine.entries[0].event_type, EvidenceEventType::Validation);
}

#[tokio::test]
async fn evidence_failure_does_not_fail_validation() {
    let harness = Harness::enabled(permissive_rules(), ServiceConfig::default()).await;
    harness.ledger.fail_on(EvidenceEventType::Validation);

    let result = harness
        .service
        .validate_action("example.com", &password_change(), "vault-item-1", false)
        .await
        .expect("decision is returned despite logging failure");
    assert_eq!(result.outcome, ValidationOutcome::Allowed);
    assert!(matches!(result.audit, AuditStatus::Failed { .. }));
    assert!(result.evidence_id.is_none());
    assert_eq!(harness.service.status().await.unwrap().stats.audit_failures, 1);

    harness.ledger.heal();
    let result = harness
        .service
        .validate_action("example.com", &password_change(), "vault-item-1", false)
        .await
        .unwrap();
    assert!(result.audit.is_recorded());
    assert!(harness.service.verify_evidence_chain().await.unwrap().valid);
    assert_eq!(harness.service.status().await.unwrap().stats.audit_failures, 1);
}

#[tokio::test]
async fn full_rate_window_downgrades_allowed_actions() {
    let config = ServiceConfig {
        rate_limit: RateLimitConfig {
            max_actions: 2,
            window_secs: 3600,
        },
        ..ServiceConfig::default()
    };
    let harness = Harness::enabled(permissive_rules(), config).await;

    for _ in 0..2 {
        let result = harness
            .service
            .validate_action("example.com", &password_change(), "vault-item-1", false)
            .await
            .unwrap();
        assert_eq!(result.outcome, ValidationOutcome::Allowed);
        assert_eq!(result.method, ExecutionMethod::Automated);
    }

    let limited = harness
        .service
        .validate_action("example.com", &password_change(), "vault-item-1", false)
        .await
        .unwrap();
    assert_eq!(limited.outcome, ValidationOutcome::Blocked);
    assert_eq!(limited.method, ExecutionMethod::Manual);
    assert!(limited.reasoning.contains("rate limit"));

    let other_site = harness
        .service
        .validate_action("other.com", &password_change(), "vault-item-1", false)
        .await
        .unwrap();
    assert_eq!(other_site.outcome, ValidationOutcome::Allowed);

    let stats = harness.service.status().await.unwrap().stats;
    assert_eq!(stats.rate_limited, 1);
    assert_eq!(stats.outcomes.allowed, 3);
    assert_eq!(stats.outcomes.blocked, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_validations_respect_the_rate_window() {
    let config = ServiceConfig {
        rate_limit: RateLimitConfig {
            max_actions: 1,
            window_secs: 3600,
        },
        ..ServiceConfig::default()
    };
    let limiter = Arc::new(SuspendingRateLimiter {
        inner: InMemoryRateLimiter::new(
            RateLimitPolicy::new(1, Duration::from_secs(3600)).unwrap(),
        ),
    });
    let service = Arc::new(
        ComplianceService::builder()
            .analyzer(MockAnalyzer::with_rules(permissive_rules()))
            .retriever(MockRetriever::new())
            .rate_limiter(limiter)
            .config(config)
            .build()
            .expect("service should build"),
    );
    service.enable(EULA, true).await.unwrap();
    service
        .analyze_tos("example.com", None, false, None)
        .await
        .unwrap();

    let tasks = (0..8).map(|n| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .validate_action(
                    "example.com",
                    &password_change(),
                    &format!("vault-item-{}", n),
                    false,
                )
                .await
                .expect("validation should succeed")
        })
    });
    let outcomes = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|result| result.unwrap().outcome)
        .collect::<Vec<_>>();

    let allowed = outcomes
        .iter()
        .filter(|outcome| **outcome == ValidationOutcome::Allowed)
        .count();
    assert_eq!(allowed, 1);
    assert_eq!(service.status().await.unwrap().stats.rate_limited, 7);
}

#[tokio::test]
async fn described_action_reaches_the_chain() {
    let harness = Harness::enabled(permissive_rules(), ServiceConfig::default()).await;
    let action = password_change().with_description("rotate after breach notice");

    let result = harness
        .service
        .validate_action("example.com", &action, "vault-item-1", false)
        .await
        .unwrap();

    let entry_id = result.evidence_id.expect("decision is recorded");
    let entry = harness
        .entries()
        .await
        .into_iter()
        .find(|entry| entry.id == entry_id)
        .expect("entry is on the chain");
    assert_eq!(
        entry.action.as_deref(),
        Some("password_change: rotate after breach notice")
    );
    assert!(entry.payload.contains("\"action_type\":\"password_change\""));
    assert!(harness.service.verify_evidence_chain().await.unwrap().valid);
}

#[tokio::test]
async fn uncovered_actions_use_the_configured_default() {
    let harness = Harness::enabled(permissive_rules(), ServiceConfig::default()).await;
    let export = ProposedAction::new("bulk_export", RuleCategory::DataAccess);

    let result = harness
        .service
        .validate_action("example.com", &export, "vault-item-1", false)
        .await
        .unwrap();
    assert_eq!(result.outcome, ValidationOutcome::RequiresHumanIntervention);
    assert_eq!(result.method, ExecutionMethod::Assisted);
    assert!(result.applied_rule_ids.is_empty());

    harness
        .service
        .set_configuration(ServiceConfig {
            default_on_uncertain: Recommendation::Blocked,
            ..ServiceConfig::default()
        })
        .unwrap();
    let result = harness
        .service
        .validate_action("example.com", &export, "vault-item-1", false)
        .await
        .unwrap();
    assert_eq!(result.outcome, ValidationOutcome::Blocked);
}

#[tokio::test]
async fn malformed_action_is_a_validation_error() {
    let harness = Harness::enabled(permissive_rules(), ServiceConfig::default()).await;
    let blank = ProposedAction::new("", RuleCategory::PasswordChange);
    assert!(matches!(
        harness
            .service
            .validate_action("example.com", &blank, "vault-item-1", false)
            .await,
        Err(credguard_service::ComplianceError::Validation(_))
    ));
}

#[tokio::test]
async fn third_party_verifies_exported_decisions() {
    let harness = Harness::enabled(permissive_rules(), ServiceConfig::default()).await;
    for n in 0..3 {
        harness
            .service
            .validate_action(
                "example.com",
                &password_change(),
                &format!("vault-item-{}", n),
                false,
            )
            .await
            .unwrap();
    }

    let export = harness
        .service
        .export_evidence_chain(&ExportFilter::all())
        .await
        .unwrap();
    let wire = serde_json::to_vec(&export).unwrap();

    let received: ChainExport = serde_json::from_slice(&wire).unwrap();
    let verifier = ChainVerifier::from_public_key_hex(&received.public_key).unwrap();
    let report = verifier.verify_export(&received);
    assert!(report.valid, "{:?}", report.errors);
    assert_eq!(report.entries_checked, 5);

    let mut forged = received.clone();
    forged.entries[3].validation_result = Some(ValidationOutcome::Blocked);
    assert!(!verifier.verify_export(&forged).valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_validations_keep_the_chain_linear() {
    let config = ServiceConfig {
        rate_limit: RateLimitConfig {
            max_actions: 1000,
            window_secs: 3600,
        },
        ..ServiceConfig::default()
    };
    let harness = Arc::new(Harness::enabled(permissive_rules(), config).await);

    let tasks = (0..32).map(|n| {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .service
                .validate_action(
                    "example.com",
                    &password_change(),
                    &format!("vault-item-{}", n),
                    false,
                )
                .await
                .expect("validation should succeed")
        })
    });
    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().audit.is_recorded());
    }

    let entries = harness.entries().await;
    let validations = entries
        .iter()
        .filter(|entry| entry.event_type == EvidenceEventType::Validation)
        .count();
    assert_eq!(validations, 32);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].previous_id, pair[0].id);
    }
    assert!(harness.service.verify_evidence_chain().await.unwrap().valid);
    assert_eq!(harness.service.status().await.unwrap().stats.validations, 32);
}
