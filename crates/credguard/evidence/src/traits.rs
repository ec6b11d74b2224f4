use crate::model::{ChainExport, ChainVerification, ExportFilter, NewEvidence};
use crate::EvidenceResult;
use async_trait::async_trait;
use credguard_types::EvidenceEntry;

/// Append-only, hash-linked, signed evidence ledger.
///
/// `add_entry` reads the head, derives the link fields, signs and commits as
/// one atomic unit; two concurrent appends never share a predecessor.
#[async_trait]
pub trait EvidenceLedger: Send + Sync {
    /// Append an entry and return its identifier.
    async fn add_entry(&self, evidence: NewEvidence) -> EvidenceResult<String>;

    /// Exact lookup. Fails with [`crate::EvidenceError::NotFound`] when absent.
    async fn get_entry(&self, id: &str) -> EvidenceResult<EvidenceEntry>;

    /// Entries matching `filter`, in chain order.
    async fn export(&self, filter: &ExportFilter) -> EvidenceResult<Vec<EvidenceEntry>>;

    /// Filtered entries packaged with the public key for an outside verifier.
    async fn export_snapshot(&self, filter: &ExportFilter) -> EvidenceResult<ChainExport>;

    /// Check one entry's signature against its own fields. Never mutates state.
    fn verify(&self, entry: &EvidenceEntry) -> bool;

    /// Walk the whole chain, collecting every signature and link failure.
    async fn verify_chain(&self) -> EvidenceResult<ChainVerification>;

    /// Identifier of the most recent entry. Fails with
    /// [`crate::EvidenceError::EmptyChain`] when nothing has been appended.
    async fn chain_head(&self) -> EvidenceResult<String>;

    async fn len(&self) -> EvidenceResult<usize>;

    /// Drop every entry and reset the head. Returns how many were removed.
    async fn clear(&self) -> EvidenceResult<usize>;

    /// Hex-encoded Ed25519 public key of the signer.
    fn public_key_hex(&self) -> String;
}
