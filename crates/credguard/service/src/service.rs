//! The compliance service state machine.
//!
//! `Disabled` (initial) ⇄ `Enabled`. Every accessor except
//! [`ComplianceService::validate_action`] refuses to run while disabled;
//! validation instead answers with a `Disabled` outcome so callers always
//! receive a decision object.
//!
//! The service lock guards only enablement, configuration and counters. It
//! is never held across an `await` and never held while a leaf component
//! could call back into the service.

use crate::capability::{ComplianceAnalyzer, DocumentRetriever};
use crate::config::ServiceConfig;
use crate::status::{ServiceState, ServiceStats, ServiceStatus};
use crate::{ComplianceError, ComplianceResult};
use chrono::{DateTime, Utc};
use credguard_cache::{InMemoryRuleCache, RuleCache};
use credguard_evidence::{
    ChainExport, ChainVerification, EvidenceLedger, ExportFilter, InMemoryEvidenceChain,
    NewEvidence,
};
use credguard_types::{
    hash_credential_id, AuditStatus, EvidenceEventType, ExecutionMethod, ProposedAction, RuleSet,
    ValidationOutcome, ValidationResult,
};
use credguard_validator::{InMemoryRateLimiter, RateLimiter, RuleValidator};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Where an analysis result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSetSource {
    Cache,
    Fresh,
}

/// Result of [`ComplianceService::analyze_tos`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub rule_set: RuleSet,
    pub source: RuleSetSource,
    /// Whether the rule-set-updated entry reached the evidence chain.
    pub audit: AuditStatus,
}

/// What [`ComplianceService::disable`] removed or wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableReport {
    pub rule_sets_cleared: usize,
    pub evidence_cleared: usize,
    /// The `disabled` entry, when evidence was preserved.
    pub disabled_entry: Option<String>,
}

/// Single budget shared by every blocking step of one operation.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    async fn run<T>(self, stage: &'static str, fut: impl Future<Output = T>) -> ComplianceResult<T> {
        tokio::time::timeout_at(self.at, fut).await.map_err(|_| {
            let after_ms = u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(stage, after_ms, "Operation deadline passed");
            ComplianceError::Timeout { stage, after_ms }
        })
    }
}

struct ServiceInner {
    state: ServiceState,
    eula_version: Option<String>,
    enabled_at: Option<DateTime<Utc>>,
    config: ServiceConfig,
    validator: RuleValidator,
    stats: ServiceStats,
}

/// Consent-gated compliance checking over a rule cache, an evidence ledger
/// and the external analysis capabilities.
pub struct ComplianceService {
    cache: Arc<dyn RuleCache>,
    ledger: Arc<dyn EvidenceLedger>,
    rate_limiter: Arc<dyn RateLimiter>,
    analyzer: Arc<dyn ComplianceAnalyzer>,
    retriever: Arc<dyn DocumentRetriever>,
    inner: RwLock<ServiceInner>,
    /// Best-effort evidence appends that failed; never behind a lock.
    audit_failures: AtomicU64,
}

/// Builder for [`ComplianceService`]. Cache, ledger and rate limiter default
/// to the in-memory implementations; analyzer and retriever are required.
#[derive(Default)]
pub struct ComplianceServiceBuilder {
    cache: Option<Arc<dyn RuleCache>>,
    ledger: Option<Arc<dyn EvidenceLedger>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    analyzer: Option<Arc<dyn ComplianceAnalyzer>>,
    retriever: Option<Arc<dyn DocumentRetriever>>,
    config: Option<ServiceConfig>,
}

impl ComplianceServiceBuilder {
    pub fn cache(mut self, cache: Arc<dyn RuleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn EvidenceLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn ComplianceAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn DocumentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate the configuration, push it into the components and return a
    /// disabled service.
    pub fn build(self) -> ComplianceResult<ComplianceService> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let policy = config.rate_limit_policy()?;

        let analyzer = self.analyzer.ok_or_else(|| {
            ComplianceError::Config("a compliance analyzer is required".to_string())
        })?;
        let retriever = self.retriever.ok_or_else(|| {
            ComplianceError::Config("a document retriever is required".to_string())
        })?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryRuleCache::new()));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryEvidenceChain::new()));
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(InMemoryRateLimiter::new(policy)));

        analyzer.set_model_path(config.analyzer_model_path.as_deref())?;
        cache.set_ttl(config.cache_ttl())?;
        rate_limiter.set_policy(policy)?;

        let validator = RuleValidator::new(config.default_on_uncertain, Arc::clone(&rate_limiter));

        Ok(ComplianceService {
            cache,
            ledger,
            rate_limiter,
            analyzer,
            retriever,
            inner: RwLock::new(ServiceInner {
                state: ServiceState::Disabled,
                eula_version: None,
                enabled_at: None,
                config,
                validator,
                stats: ServiceStats::default(),
            }),
            audit_failures: AtomicU64::new(0),
        })
    }
}

fn normalize_site(site: &str) -> ComplianceResult<String> {
    let site = site.trim().to_ascii_lowercase();
    if site.is_empty() {
        return Err(ComplianceError::Validation(
            "site must not be empty".to_string(),
        ));
    }
    Ok(site)
}

impl ComplianceService {
    pub fn builder() -> ComplianceServiceBuilder {
        ComplianceServiceBuilder::default()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&ServiceInner) -> T) -> ComplianceResult<T> {
        let guard = self
            .inner
            .read()
            .map_err(|_| ComplianceError::Persistence("service state lock poisoned".to_string()))?;
        Ok(f(&guard))
    }

    fn with_inner_mut<T>(&self, f: impl FnOnce(&mut ServiceInner) -> T) -> ComplianceResult<T> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| ComplianceError::Persistence("service state lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }

    /// Configuration and validator, or `NotEnabled`.
    fn enabled_snapshot(&self) -> ComplianceResult<(ServiceConfig, RuleValidator)> {
        self.with_inner(|inner| match inner.state {
            ServiceState::Enabled => Ok((inner.config.clone(), inner.validator.clone())),
            ServiceState::Disabled => Err(ComplianceError::NotEnabled),
        })?
    }

    fn ensure_enabled(&self) -> ComplianceResult<()> {
        self.enabled_snapshot().map(|_| ())
    }

    /// Record consent and start compliance checking.
    ///
    /// The `enabled` entry is the proof of consent: if it cannot be written
    /// the service stays as it was and the error is returned. Returns the
    /// entry id.
    pub async fn enable(&self, eula_version: &str, consent: bool) -> ComplianceResult<String> {
        let eula_version = eula_version.trim();
        if eula_version.is_empty() {
            return Err(ComplianceError::ConsentRequired(
                "EULA version must not be empty".to_string(),
            ));
        }
        if !consent {
            return Err(ComplianceError::ConsentRequired(
                "explicit consent to the EULA is required".to_string(),
            ));
        }

        let enabled_at = Utc::now();
        let evidence = NewEvidence::new(EvidenceEventType::Enabled).with_payload(json!({
            "eula_version": eula_version,
            "consent": true,
            "enabled_at": enabled_at,
        }));
        let entry_id = self.ledger.add_entry(evidence).await.map_err(|err| {
            tracing::error!(error = %err, "Failed to record consent; compliance checking not enabled");
            ComplianceError::from(err)
        })?;

        self.with_inner_mut(|inner| {
            inner.state = ServiceState::Enabled;
            inner.eula_version = Some(eula_version.to_string());
            inner.enabled_at = Some(enabled_at);
        })?;

        tracing::info!(eula_version, entry_id = %entry_id, "Compliance checking enabled");
        Ok(entry_id)
    }

    /// Stop compliance checking.
    ///
    /// With `preserve_evidence` a `disabled` entry is appended (its failure is
    /// returned); without it the evidence chain is cleared.
    pub async fn disable(
        &self,
        clear_cache: bool,
        preserve_evidence: bool,
    ) -> ComplianceResult<DisableReport> {
        let previous = self.with_inner_mut(|inner| {
            std::mem::replace(&mut inner.state, ServiceState::Disabled)
        })?;

        let mut report = DisableReport::default();
        if clear_cache {
            report.rule_sets_cleared = self.cache.clear().await?;
        }

        if preserve_evidence {
            let evidence = NewEvidence::new(EvidenceEventType::Disabled).with_payload(json!({
                "previous_state": previous,
                "cache_cleared": clear_cache,
            }));
            report.disabled_entry = Some(self.ledger.add_entry(evidence).await?);
        } else {
            report.evidence_cleared = self.ledger.clear().await?;
        }

        tracing::info!(
            previous = %previous,
            rule_sets_cleared = report.rule_sets_cleared,
            evidence_cleared = report.evidence_cleared,
            preserve_evidence,
            "Compliance checking disabled"
        );
        Ok(report)
    }

    pub fn state(&self) -> ComplianceResult<ServiceState> {
        self.with_inner(|inner| inner.state)
    }

    /// Rule set for `site`, cache first.
    ///
    /// A miss (or `force_refresh`) discovers the terms-of-service URL when
    /// none is given, fetches and analyzes it, caches the result and appends a
    /// `rule_set_updated` entry. `timeout` (default: the configured analysis
    /// timeout) bounds discovery, fetch and analysis together.
    pub async fn analyze_tos(
        &self,
        site: &str,
        url: Option<&str>,
        force_refresh: bool,
        timeout: Option<Duration>,
    ) -> ComplianceResult<AnalysisOutcome> {
        let (config, _) = self.enabled_snapshot()?;
        let site = normalize_site(site)?;
        let deadline = Deadline::after(timeout.unwrap_or_else(|| config.analysis_timeout()));
        self.obtain_rule_set(&site, url, force_refresh, &config, deadline)
            .await
    }

    async fn obtain_rule_set(
        &self,
        site: &str,
        url: Option<&str>,
        force_refresh: bool,
        config: &ServiceConfig,
        deadline: Deadline,
    ) -> ComplianceResult<AnalysisOutcome> {
        if !force_refresh {
            if let Some(rule_set) = self.cache.get(site).await? {
                self.with_inner_mut(|inner| inner.stats.cache_hits += 1)?;
                tracing::debug!(site, rule_set_id = %rule_set.id, "Rule set cache hit");
                return Ok(AnalysisOutcome {
                    rule_set,
                    source: RuleSetSource::Cache,
                    audit: AuditStatus::Skipped {
                        reason: "served from cache".to_string(),
                    },
                });
            }
        }
        self.with_inner_mut(|inner| inner.stats.cache_misses += 1)?;
        tracing::debug!(site, force_refresh, "Rule set cache miss");

        let url = match url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => url.to_string(),
            None => self.discover(site, config, deadline).await?,
        };

        if !deadline
            .run("analyzer availability", self.analyzer.is_available())
            .await?
        {
            return Err(ComplianceError::AnalyzerUnavailable);
        }

        let text = deadline.run("fetch", self.retriever.fetch(&url)).await??;
        let mut rule_set = deadline
            .run("analysis", self.analyzer.analyze(&text, site, &url))
            .await??;

        let returned_site = rule_set.site.trim().to_ascii_lowercase();
        if !returned_site.is_empty() && returned_site != site {
            return Err(ComplianceError::Validation(format!(
                "analyzer returned a rule set for {} while analyzing {}",
                returned_site, site
            )));
        }
        rule_set.site = site.to_string();
        if rule_set.source_url.is_none() {
            rule_set.source_url = Some(url);
        }

        let stored = self.cache.store(rule_set).await?;
        self.with_inner_mut(|inner| inner.stats.analyses += 1)?;
        tracing::info!(
            site,
            rule_set_id = %stored.id,
            rules = stored.rule_count(),
            recommendation = %stored.recommendation,
            "Rule set updated"
        );

        let audit = if config.evidence_enabled {
            let evidence = NewEvidence::new(EvidenceEventType::RuleSetUpdated)
                .with_site(site)
                .with_rule_set_id(&stored.id)
                .with_payload(json!({
                    "document_version": stored.document_version,
                    "document_hash": stored.document_hash,
                    "rule_count": stored.rule_count(),
                    "recommendation": stored.recommendation,
                    "source_url": stored.source_url,
                    "expires_at": stored.expires_at,
                }));
            self.record_best_effort(evidence).await
        } else {
            AuditStatus::Skipped {
                reason: "evidence logging disabled".to_string(),
            }
        };

        Ok(AnalysisOutcome {
            rule_set: stored,
            source: RuleSetSource::Fresh,
            audit,
        })
    }

    async fn discover(
        &self,
        site: &str,
        config: &ServiceConfig,
        deadline: Deadline,
    ) -> ComplianceResult<String> {
        let discovered = deadline
            .run("discovery", self.retriever.discover(site))
            .await?;

        match discovered.error {
            None if !discovered.url.trim().is_empty() => Ok(discovered.url),
            None => Err(ComplianceError::Fetch(format!(
                "discovery returned no terms-of-service URL for {}",
                site
            ))),
            Some(reason)
                if config.accept_discovery_fallback && !discovered.url.trim().is_empty() =>
            {
                tracing::warn!(
                    site,
                    url = %discovered.url,
                    reason = %reason,
                    "Terms-of-service discovery failed; using unconfirmed URL"
                );
                Ok(discovered.url)
            }
            Some(reason) => Err(ComplianceError::Fetch(format!(
                "could not discover terms of service for {}: {}",
                site, reason
            ))),
        }
    }

    /// Append an entry whose loss must not fail the surrounding operation.
    async fn record_best_effort(&self, evidence: NewEvidence) -> AuditStatus {
        let event_type = evidence.event_type;
        match self.ledger.add_entry(evidence).await {
            Ok(entry_id) => AuditStatus::Recorded { entry_id },
            Err(err) => {
                tracing::warn!(
                    event_type = %event_type,
                    error = %err,
                    "Evidence logging failed; continuing without audit record"
                );
                self.audit_failures.fetch_add(1, Ordering::Relaxed);
                AuditStatus::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Live cached rule set for `site`; `None` when absent or expired.
    pub async fn get_crc(&self, site: &str) -> ComplianceResult<Option<RuleSet>> {
        self.ensure_enabled()?;
        Ok(self.cache.get(&normalize_site(site)?).await?)
    }

    pub async fn list_crcs(
        &self,
        site_filter: Option<&str>,
        include_expired: bool,
    ) -> ComplianceResult<Vec<RuleSet>> {
        self.ensure_enabled()?;
        let filter = site_filter.map(|site| site.trim().to_ascii_lowercase());
        Ok(self
            .cache
            .list(filter.as_deref(), include_expired)
            .await?)
    }

    pub async fn invalidate_crc(&self, site: &str) -> ComplianceResult<bool> {
        self.ensure_enabled()?;
        let site = normalize_site(site)?;
        let removed = self.cache.invalidate(&site).await?;
        tracing::info!(site = %site, removed, "Rule set invalidated");
        Ok(removed)
    }

    /// Remove every expired rule set from the cache and drop rate windows
    /// with no live action. Returns the number of rule sets removed.
    pub async fn clean_expired_crcs(&self) -> ComplianceResult<usize> {
        self.ensure_enabled()?;
        let removed = self.cache.clean_expired().await?;
        let windows = self.rate_limiter.prune_expired().await?;
        tracing::info!(removed, windows, "Expired rule sets and rate windows removed");
        Ok(removed)
    }

    /// Decide whether `action` may run on `site`.
    ///
    /// An allowed action whose rate window is full is downgraded to
    /// `Blocked`; an allowed action that fits is counted against the window.
    /// Only a one-way hash of `credential_id` reaches the evidence chain.
    pub async fn validate_action(
        &self,
        site: &str,
        action: &ProposedAction,
        credential_id: &str,
        force_refresh: bool,
    ) -> ComplianceResult<ValidationResult> {
        let snapshot = self.with_inner(|inner| {
            (inner.state == ServiceState::Enabled)
                .then(|| (inner.config.clone(), inner.validator.clone()))
        })?;
        let Some((config, validator)) = snapshot else {
            self.with_inner_mut(|inner| {
                inner.stats.validations += 1;
                inner.stats.outcomes.increment(ValidationOutcome::Disabled);
            })?;
            tracing::debug!(site = %site.trim(), "Validation requested while disabled");
            return Ok(ValidationResult::disabled(site.trim()));
        };

        let site = normalize_site(site)?;
        let deadline = Deadline::after(config.analysis_timeout());
        let analysis = self
            .obtain_rule_set(&site, None, force_refresh, &config, deadline)
            .await?;

        let mut result = validator.validate(&analysis.rule_set, action)?;
        if result.outcome.is_allowed() && !validator.acquire_rate_slot(&site, action).await? {
            let policy = self.rate_limiter.policy();
            result.outcome = ValidationOutcome::Blocked;
            result.method = ExecutionMethod::Manual;
            result.reasoning = format!(
                "{}; rate limit of {} {} action(s) per {}s reached",
                result.reasoning,
                policy.max_actions,
                action.action_type,
                policy.window.as_secs()
            );
            self.with_inner_mut(|inner| inner.stats.rate_limited += 1)?;
            tracing::info!(
                site = %site,
                action_type = %action.action_type,
                "Allowed action downgraded by rate limit"
            );
        }

        let audit = if config.evidence_enabled {
            let evidence = NewEvidence::new(EvidenceEventType::Validation)
                .with_site(&site)
                .with_credential_hash(hash_credential_id(credential_id))
                .with_action(action.summary())
                .with_validation_result(result.outcome)
                .with_rule_set_id(result.rule_set_id.clone().unwrap_or_default())
                .with_applied_rule_ids(result.applied_rule_ids.clone())
                .with_payload(json!({
                    "action_type": action.action_type,
                    "reasoning": result.reasoning,
                    "method": result.method,
                    "category": action.category,
                }));
            self.record_best_effort(evidence).await
        } else {
            AuditStatus::Skipped {
                reason: "evidence logging disabled".to_string(),
            }
        };

        self.with_inner_mut(|inner| {
            inner.stats.validations += 1;
            inner.stats.outcomes.increment(result.outcome);
        })?;

        tracing::info!(
            site = %site,
            action_type = %action.action_type,
            outcome = %result.outcome,
            method = %result.method,
            recorded = audit.is_recorded(),
            "Action validated"
        );
        Ok(result.with_audit(audit))
    }

    /// Snapshot of the evidence chain for an independent verifier.
    pub async fn export_evidence_chain(
        &self,
        filter: &ExportFilter,
    ) -> ComplianceResult<ChainExport> {
        self.ensure_enabled()?;
        Ok(self.ledger.export_snapshot(filter).await?)
    }

    /// Walk the whole chain. Available in either state so preserved evidence
    /// can be checked after disabling.
    pub async fn verify_evidence_chain(&self) -> ComplianceResult<ChainVerification> {
        Ok(self.ledger.verify_chain().await?)
    }

    /// Like [`Self::verify_evidence_chain`], but a broken chain is an error.
    /// Returns the number of entries checked.
    pub async fn ensure_evidence_chain_intact(&self) -> ComplianceResult<usize> {
        let report = self.verify_evidence_chain().await?;
        if !report.valid {
            return Err(ComplianceError::CryptographicMismatch(report.errors));
        }
        Ok(report.entries_checked)
    }

    /// Apply a new configuration.
    ///
    /// Changes apply to future operations only; cached rule sets keep the
    /// expiry they were stored with.
    pub fn set_configuration(&self, config: ServiceConfig) -> ComplianceResult<()> {
        config.validate()?;
        let policy = config.rate_limit_policy()?;

        self.with_inner_mut(|inner| -> ComplianceResult<()> {
            self.analyzer
                .set_model_path(config.analyzer_model_path.as_deref())?;
            self.cache.set_ttl(config.cache_ttl())?;
            self.rate_limiter.set_policy(policy)?;
            inner.validator = inner
                .validator
                .with_default_on_uncertain(config.default_on_uncertain);
            inner.config = config;
            Ok(())
        })??;

        tracing::info!("Configuration applied");
        Ok(())
    }

    pub fn configuration(&self) -> ComplianceResult<ServiceConfig> {
        self.with_inner(|inner| inner.config.clone())
    }

    pub fn public_key_hex(&self) -> String {
        self.ledger.public_key_hex()
    }

    pub async fn status(&self) -> ComplianceResult<ServiceStatus> {
        let (state, eula_version, enabled_at, config, mut stats) = self.with_inner(|inner| {
            (
                inner.state,
                inner.eula_version.clone(),
                inner.enabled_at,
                inner.config.clone(),
                inner.stats.clone(),
            )
        })?;
        stats.audit_failures = self.audit_failures.load(Ordering::Relaxed);

        Ok(ServiceStatus {
            state,
            eula_version,
            enabled_at,
            config,
            stats,
            cache_size: self.cache.len().await?,
            chain_length: self.ledger.len().await?,
            analyzer_available: self.analyzer.is_available().await,
            analyzer_model_version: self.analyzer.model_version(),
            analyzer_model_path: self.analyzer.model_path(),
            public_key: self.ledger.public_key_hex(),
        })
    }
}
