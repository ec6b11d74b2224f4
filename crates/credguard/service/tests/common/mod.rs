#![allow(dead_code)]

use async_trait::async_trait;
use credguard_evidence::{
    ChainExport, ChainVerification, EvidenceError, EvidenceLedger, EvidenceResult, ExportFilter,
    InMemoryEvidenceChain, NewEvidence,
};
use credguard_service::{
    CapabilityError, CapabilityResult, ComplianceAnalyzer, ComplianceService, DiscoveredUrl,
    DocumentRetriever, ServiceConfig,
};
use credguard_types::{
    digest_hex, EvidenceEntry, EvidenceEventType, ProposedAction, Recommendation, Rule,
    RuleCategory, RuleSet, RuleSeverity,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EULA: &str = "2024.1";

pub struct MockAnalyzer {
    available: AtomicBool,
    calls: AtomicUsize,
    rules: Mutex<Vec<Rule>>,
    returned_site: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    model_path: Mutex<Option<String>>,
}

impl MockAnalyzer {
    pub fn with_rules(rules: Vec<Rule>) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            rules: Mutex::new(rules),
            returned_site: Mutex::new(None),
            delay: Mutex::new(None),
            model_path: Mutex::new(None),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_rules(&self, rules: Vec<Rule>) {
        *self.rules.lock().unwrap() = rules;
    }

    /// Make `analyze` report this site instead of the one it was asked about.
    pub fn set_returned_site(&self, site: Option<&str>) {
        *self.returned_site.lock().unwrap() = site.map(str::to_string);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComplianceAnalyzer for MockAnalyzer {
    async fn analyze(&self, text: &str, site: &str, url: &str) -> CapabilityResult<RuleSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let returned_site = self
            .returned_site
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| site.to_string());
        let rules = self.rules.lock().unwrap().clone();
        Ok(RuleSet::new(returned_site, "2024-01", digest_hex(text.as_bytes()))
            .with_rules(rules)
            .with_recommendation(Recommendation::Allowed)
            .with_reasoning(format!("analyzed {}", url)))
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn model_version(&self) -> Option<String> {
        Some("mock-1".to_string())
    }

    fn model_path(&self) -> Option<String> {
        self.model_path.lock().unwrap().clone()
    }

    fn set_model_path(&self, path: Option<&str>) -> CapabilityResult<()> {
        *self.model_path.lock().unwrap() = path.map(str::to_string);
        Ok(())
    }
}

pub struct MockRetriever {
    discovery: Mutex<Option<DiscoveredUrl>>,
    discoveries: AtomicUsize,
    fetches: AtomicUsize,
    fetch_delay: Mutex<Option<Duration>>,
    fail_fetch: AtomicBool,
}

impl MockRetriever {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            discovery: Mutex::new(None),
            discoveries: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            fetch_delay: Mutex::new(None),
            fail_fetch: AtomicBool::new(false),
        })
    }

    /// Override the default `https://{site}/terms` discovery result.
    pub fn set_discovery(&self, discovered: DiscoveredUrl) {
        *self.discovery.lock().unwrap() = Some(discovered);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRetriever for MockRetriever {
    async fn fetch(&self, url: &str) -> CapabilityResult<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(CapabilityError::Fetch(format!("connection refused: {}", url)));
        }
        Ok(format!("Terms of service published at {}", url))
    }

    async fn discover(&self, site: &str) -> DiscoveredUrl {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        self.discovery
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| DiscoveredUrl::found(format!("https://{}/terms", site)))
    }
}

/// Ledger that refuses selected event types and delegates everything else.
pub struct FlakyLedger {
    inner: InMemoryEvidenceChain,
    failing: Mutex<HashSet<EvidenceEventType>>,
}

impl FlakyLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryEvidenceChain::new(),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_on(&self, event_type: EvidenceEventType) {
        self.failing.lock().unwrap().insert(event_type);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl EvidenceLedger for FlakyLedger {
    async fn add_entry(&self, evidence: NewEvidence) -> EvidenceResult<String> {
        let refuse = self.failing.lock().unwrap().contains(&evidence.event_type);
        if refuse {
            return Err(EvidenceError::Backend("disk full".to_string()));
        }
        self.inner.add_entry(evidence).await
    }

    async fn get_entry(&self, id: &str) -> EvidenceResult<EvidenceEntry> {
        self.inner.get_entry(id).await
    }

    async fn export(&self, filter: &ExportFilter) -> EvidenceResult<Vec<EvidenceEntry>> {
        self.inner.export(filter).await
    }

    async fn export_snapshot(&self, filter: &ExportFilter) -> EvidenceResult<ChainExport> {
        self.inner.export_snapshot(filter).await
    }

    fn verify(&self, entry: &EvidenceEntry) -> bool {
        self.inner.verify(entry)
    }

    async fn verify_chain(&self) -> EvidenceResult<ChainVerification> {
        self.inner.verify_chain().await
    }

    async fn chain_head(&self) -> EvidenceResult<String> {
        self.inner.chain_head().await
    }

    async fn len(&self) -> EvidenceResult<usize> {
        self.inner.len().await
    }

    async fn clear(&self) -> EvidenceResult<usize> {
        self.inner.clear().await
    }

    fn public_key_hex(&self) -> String {
        self.inner.public_key_hex()
    }
}

pub struct Harness {
    pub service: ComplianceService,
    pub analyzer: Arc<MockAnalyzer>,
    pub retriever: Arc<MockRetriever>,
    pub ledger: Arc<FlakyLedger>,
}

impl Harness {
    pub fn new(rules: Vec<Rule>, config: ServiceConfig) -> Self {
        let analyzer = MockAnalyzer::with_rules(rules);
        let retriever = MockRetriever::new();
        let ledger = FlakyLedger::new();
        let service = ComplianceService::builder()
            .analyzer(analyzer.clone())
            .retriever(retriever.clone())
            .ledger(ledger.clone())
            .config(config)
            .build()
            .expect("service should build");
        Self {
            service,
            analyzer,
            retriever,
            ledger,
        }
    }

    pub async fn enabled(rules: Vec<Rule>, config: ServiceConfig) -> Self {
        let harness = Self::new(rules, config);
        harness
            .service
            .enable(EULA, true)
            .await
            .expect("enable should succeed");
        harness
    }

    pub async fn entries(&self) -> Vec<EvidenceEntry> {
        self.ledger
            .export(&ExportFilter::all())
            .await
            .expect("export should succeed")
    }
}

pub fn rule(id: &str, category: RuleCategory, severity: RuleSeverity) -> Rule {
    Rule::new(id, category, severity, format!("clause {}", id))
}

pub fn permissive_rules() -> Vec<Rule> {
    vec![rule(
        "pw-ok",
        RuleCategory::PasswordChange,
        RuleSeverity::Permitted,
    )]
}

pub fn password_change() -> ProposedAction {
    ProposedAction::new("password_change", RuleCategory::PasswordChange)
}
