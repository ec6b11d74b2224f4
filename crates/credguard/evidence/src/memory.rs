//! In-memory reference implementation of [`EvidenceLedger`].

use crate::model::{ChainExport, ChainVerification, ExportFilter, NewEvidence};
use crate::signer::{compute_chain_hash, ChainVerifier, EvidenceSigner};
use crate::traits::EvidenceLedger;
use crate::{EvidenceError, EvidenceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credguard_types::EvidenceEntry;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct ChainState {
    entries: Vec<EvidenceEntry>,
    index: HashMap<String, usize>,
    head: String,
    sequence: u64,
}

impl ChainState {
    fn next_id(&mut self, evidence: &NewEvidence, timestamp: DateTime<Utc>) -> String {
        loop {
            self.sequence += 1;
            let nanos = timestamp.timestamp_nanos_opt().unwrap_or_default();
            let mut hasher = blake3::Hasher::new();
            hasher.update(&nanos.to_le_bytes());
            hasher.update(evidence.site.as_bytes());
            hasher.update(evidence.credential_hash.as_bytes());
            hasher.update(evidence.event_type.as_str().as_bytes());
            hasher.update(&self.sequence.to_le_bytes());
            hasher.update(&rand::thread_rng().next_u64().to_le_bytes());
            let digest = hasher.finalize();
            let id = format!("ev_{}", hex::encode(&digest.as_bytes()[..8]));
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Evidence chain held in process memory, signed with a key that lives as
/// long as the chain.
pub struct InMemoryEvidenceChain {
    signer: EvidenceSigner,
    verifier: ChainVerifier,
    state: RwLock<ChainState>,
}

impl InMemoryEvidenceChain {
    /// Chain with a freshly generated signing key.
    pub fn new() -> Self {
        Self::with_signer(EvidenceSigner::generate())
    }

    pub fn with_signer(signer: EvidenceSigner) -> Self {
        let verifier = signer.verifier();
        Self {
            signer,
            verifier,
            state: RwLock::new(ChainState::default()),
        }
    }

    pub fn verifier(&self) -> &ChainVerifier {
        &self.verifier
    }

    fn read_entries<T>(&self, f: impl FnOnce(&ChainState) -> T) -> EvidenceResult<T> {
        let guard = self
            .state
            .read()
            .map_err(|_| EvidenceError::Backend("evidence chain lock poisoned".to_string()))?;
        Ok(f(&guard))
    }
}

impl Default for InMemoryEvidenceChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceLedger for InMemoryEvidenceChain {
    async fn add_entry(&self, evidence: NewEvidence) -> EvidenceResult<String> {
        let payload = serde_json::to_string(&evidence.payload)
            .map_err(|e| EvidenceError::Serialization(e.to_string()))?;

        let mut guard = self
            .state
            .write()
            .map_err(|_| EvidenceError::Backend("evidence chain lock poisoned".to_string()))?;

        let timestamp = Utc::now();
        let id = guard.next_id(&evidence, timestamp);
        let previous_id = guard.head.clone();
        let chain_hash = compute_chain_hash(&id, &previous_id);

        let mut entry = EvidenceEntry {
            id: id.clone(),
            timestamp,
            event_type: evidence.event_type,
            site: evidence.site,
            credential_hash: evidence.credential_hash,
            action: evidence.action,
            validation_result: evidence.validation_result,
            rule_set_id: evidence.rule_set_id,
            applied_rule_ids: evidence.applied_rule_ids,
            payload,
            previous_id,
            chain_hash,
            signature: String::new(),
        };
        entry.signature = self.signer.sign(&entry);

        let event_type = entry.event_type;
        let position = guard.entries.len();
        guard.index.insert(id.clone(), position);
        guard.entries.push(entry);
        guard.head = id.clone();
        drop(guard);

        tracing::debug!(
            entry_id = %id,
            event_type = %event_type,
            position,
            "Appended evidence entry"
        );

        Ok(id)
    }

    async fn get_entry(&self, id: &str) -> EvidenceResult<EvidenceEntry> {
        self.read_entries(|state| {
            state
                .index
                .get(id)
                .and_then(|&position| state.entries.get(position))
                .cloned()
        })?
        .ok_or_else(|| EvidenceError::NotFound(id.to_string()))
    }

    async fn export(&self, filter: &ExportFilter) -> EvidenceResult<Vec<EvidenceEntry>> {
        self.read_entries(|state| {
            state
                .entries
                .iter()
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect()
        })
    }

    async fn export_snapshot(&self, filter: &ExportFilter) -> EvidenceResult<ChainExport> {
        let entries = self.export(filter).await?;
        Ok(ChainExport {
            public_key: self.signer.public_key_hex(),
            entry_count: entries.len(),
            entries,
            exported_at: Utc::now(),
        })
    }

    fn verify(&self, entry: &EvidenceEntry) -> bool {
        self.verifier.verify(entry)
    }

    async fn verify_chain(&self) -> EvidenceResult<ChainVerification> {
        let report = self.read_entries(|state| self.verifier.verify_chain(&state.entries))?;
        if !report.valid {
            tracing::error!(
                entries = report.entries_checked,
                failures = report.errors.len(),
                "Evidence chain verification failed"
            );
        }
        Ok(report)
    }

    async fn chain_head(&self) -> EvidenceResult<String> {
        let head = self.read_entries(|state| state.head.clone())?;
        if head.is_empty() {
            return Err(EvidenceError::EmptyChain);
        }
        Ok(head)
    }

    async fn len(&self) -> EvidenceResult<usize> {
        self.read_entries(|state| state.entries.len())
    }

    async fn clear(&self) -> EvidenceResult<usize> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| EvidenceError::Backend("evidence chain lock poisoned".to_string()))?;
        let removed = guard.entries.len();
        guard.entries.clear();
        guard.index.clear();
        guard.head.clear();
        drop(guard);

        tracing::info!(removed, "Cleared evidence chain");
        Ok(removed)
    }

    fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }
}
