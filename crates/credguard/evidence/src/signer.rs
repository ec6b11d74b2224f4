//! Entry signing and independent verification.
//!
//! [`EvidenceSigner`] holds the process-lifetime Ed25519 key. [`ChainVerifier`]
//! needs only the public key, so a third party holding an exported chain runs
//! exactly the checks the chain runs on itself.

use crate::error::{EvidenceError, EvidenceResult};
use crate::model::{ChainExport, ChainVerification};
use credguard_types::{digest_hex, EvidenceEntry};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashSet;
use std::fmt;

/// Canonical encoding of every signed field of an entry.
///
/// Each field is written as `<byte length>:<value>` and fields are joined
/// with `|`, so no value can shift bytes into its neighbour. The first eight
/// fields are `id, unix timestamp, site, credential hash, event type,
/// validation result, rule set id, chain hash`; they are followed by the
/// predecessor id, the action, the applied rule ids (a count followed by each
/// id, themselves length-prefixed) and the BLAKE3 digest of the payload.
pub fn canonical_string(entry: &EvidenceEntry) -> String {
    let mut rule_ids = entry.applied_rule_ids.len().to_string();
    for rule_id in &entry.applied_rule_ids {
        push_field(&mut rule_ids, rule_id);
    }

    let timestamp = entry.timestamp.timestamp().to_string();
    let payload_digest = digest_hex(entry.payload.as_bytes());

    let mut out = String::new();
    for field in [
        entry.id.as_str(),
        &timestamp,
        &entry.site,
        &entry.credential_hash,
        entry.event_type.as_str(),
        entry.validation_result_str(),
        &entry.rule_set_id,
        &entry.chain_hash,
        &entry.previous_id,
        entry.action.as_deref().unwrap_or(""),
        &rule_ids,
        &payload_digest,
    ] {
        push_field(&mut out, field);
    }
    out
}

fn push_field(out: &mut String, value: &str) {
    if !out.is_empty() {
        out.push('|');
    }
    out.push_str(&value.len().to_string());
    out.push(':');
    out.push_str(value);
}

/// `H(id ‖ previous_id)`, or `H(id)` for the first entry.
pub fn compute_chain_hash(id: &str, previous_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(id.as_bytes());
    if !previous_id.is_empty() {
        hasher.update(previous_id.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Ed25519 signer for evidence entries.
pub struct EvidenceSigner {
    signing_key: SigningKey,
}

impl EvidenceSigner {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let signer = Self::from_secret_bytes(&secret);
        secret.fill(0);
        signer
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Verifier bound to this signer's public key.
    pub fn verifier(&self) -> ChainVerifier {
        ChainVerifier {
            verifying_key: self.verifying_key(),
        }
    }

    /// Hex-encoded signature over the entry's canonical encoding.
    pub fn sign(&self, entry: &EvidenceEntry) -> String {
        let signature = self.signing_key.sign(canonical_string(entry).as_bytes());
        hex::encode(signature.to_bytes())
    }
}

impl fmt::Debug for EvidenceSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceSigner")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Public-key-only verifier for entries and chains.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    verifying_key: VerifyingKey,
}

impl ChainVerifier {
    pub fn new(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    pub fn from_public_key_hex(public_key: &str) -> EvidenceResult<Self> {
        let bytes = hex::decode(public_key.trim())
            .map_err(|e| EvidenceError::InvalidKey(format!("not hex: {}", e)))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            EvidenceError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| EvidenceError::InvalidKey(e.to_string()))?;
        Ok(Self { verifying_key })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Check the entry's signature against its own fields.
    pub fn verify(&self, entry: &EvidenceEntry) -> bool {
        let Ok(bytes) = hex::decode(&entry.signature) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let signature = Signature::from_bytes(&bytes);
        self.verifying_key
            .verify(canonical_string(entry).as_bytes(), &signature)
            .is_ok()
    }

    /// Walk `entries` in order, accumulating every failure.
    ///
    /// Checks each signature, that no id repeats, that the first entry has no
    /// predecessor, that every later entry names the actual previous entry,
    /// and that every chain hash matches a fresh recomputation against the
    /// actual predecessor.
    pub fn verify_chain(&self, entries: &[EvidenceEntry]) -> ChainVerification {
        let mut errors = Vec::new();
        let mut seen = HashSet::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if !self.verify(entry) {
                errors.push(format!(
                    "entry {} ({}): signature verification failed",
                    index, entry.id
                ));
            }

            if !seen.insert(entry.id.as_str()) {
                errors.push(format!("entry {} ({}): duplicate entry id", index, entry.id));
            }

            let actual_previous = match index {
                0 => "",
                _ => entries[index - 1].id.as_str(),
            };

            if entry.previous_id != actual_previous {
                if index == 0 {
                    errors.push(format!(
                        "entry 0 ({}): first entry names predecessor {}",
                        entry.id, entry.previous_id
                    ));
                } else {
                    errors.push(format!(
                        "entry {} ({}): broken link, expected predecessor {}, found {}",
                        index, entry.id, actual_previous, entry.previous_id
                    ));
                }
            }

            let expected_hash = compute_chain_hash(&entry.id, actual_previous);
            if entry.chain_hash != expected_hash {
                errors.push(format!(
                    "entry {} ({}): chain hash mismatch, expected {}, found {}",
                    index, entry.id, expected_hash, entry.chain_hash
                ));
            }
        }

        ChainVerification::failed(entries.len(), errors)
    }

    /// Verify an exported snapshot, including its declared entry count.
    pub fn verify_export(&self, export: &ChainExport) -> ChainVerification {
        let mut report = self.verify_chain(&export.entries);
        if export.entry_count != export.entries.len() {
            report.errors.push(format!(
                "export declares {} entries but contains {}",
                export.entry_count,
                export.entries.len()
            ));
            report.valid = false;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use credguard_types::EvidenceEventType;

    fn signed_entry(signer: &EvidenceSigner, id: &str, previous_id: &str) -> EvidenceEntry {
        let mut entry = EvidenceEntry {
            id: id.to_string(),
            timestamp: Utc::now(),
            event_type: EvidenceEventType::Enabled,
            site: String::new(),
            credential_hash: String::new(),
            action: None,
            validation_result: None,
            rule_set_id: String::new(),
            applied_rule_ids: vec![],
            payload: "{\"eula_version\":\"1.0\"}".to_string(),
            previous_id: previous_id.to_string(),
            chain_hash: compute_chain_hash(id, previous_id),
            signature: String::new(),
        };
        entry.signature = signer.sign(&entry);
        entry
    }

    #[test]
    fn chain_hash_of_first_entry_hashes_id_only() {
        assert_eq!(
            compute_chain_hash("ev_a", ""),
            blake3::hash(b"ev_a").to_hex().to_string()
        );
        assert_eq!(
            compute_chain_hash("ev_b", "ev_a"),
            blake3::hash(b"ev_bev_a").to_hex().to_string()
        );
    }

    #[test]
    fn canonical_string_starts_with_core_fields() {
        let signer = EvidenceSigner::from_secret_bytes(&[7u8; 32]);
        let entry = signed_entry(&signer, "ev_a", "");
        let canonical = canonical_string(&entry);
        let timestamp = entry.timestamp.timestamp().to_string();
        assert!(canonical.starts_with(&format!(
            "4:ev_a|{}:{}|0:|0:|7:enabled|",
            timestamp.len(),
            timestamp
        )));
        assert!(canonical.contains(&format!("|64:{}|", entry.chain_hash)));
        assert!(canonical.ends_with(&format!(
            "|1:0|64:{}",
            digest_hex(entry.payload.as_bytes())
        )));
    }

    #[test]
    fn separators_inside_values_change_the_encoding() {
        let signer = EvidenceSigner::from_secret_bytes(&[8u8; 32]);
        let mut split = signed_entry(&signer, "ev_a", "");
        split.applied_rule_ids = vec!["a".into(), "b".into()];
        let mut merged = split.clone();
        merged.applied_rule_ids = vec!["a,b".into()];
        assert_ne!(canonical_string(&split), canonical_string(&merged));

        let mut shifted = split.clone();
        shifted.action = Some("login".into());
        shifted.applied_rule_ids = vec!["r1|r2".into()];
        let mut moved = shifted.clone();
        moved.action = Some("login|r1".into());
        moved.applied_rule_ids = vec!["r2".into()];
        assert_ne!(canonical_string(&shifted), canonical_string(&moved));
    }

    #[test]
    fn verifier_from_public_key_accepts_signed_entry() {
        let signer = EvidenceSigner::generate();
        let entry = signed_entry(&signer, "ev_a", "");
        let verifier = ChainVerifier::from_public_key_hex(&signer.public_key_hex()).unwrap();
        assert!(verifier.verify(&entry));
    }

    #[test]
    fn verifier_with_other_key_rejects() {
        let signer = EvidenceSigner::from_secret_bytes(&[1u8; 32]);
        let other = EvidenceSigner::from_secret_bytes(&[2u8; 32]);
        let entry = signed_entry(&signer, "ev_a", "");
        assert!(!other.verifier().verify(&entry));
    }

    #[test]
    fn malformed_signature_is_rejected() {
        let signer = EvidenceSigner::generate();
        let mut entry = signed_entry(&signer, "ev_a", "");
        entry.signature = "zz".to_string();
        assert!(!signer.verifier().verify(&entry));
        entry.signature = "abcd".to_string();
        assert!(!signer.verifier().verify(&entry));
    }

    #[test]
    fn invalid_public_key_is_an_error() {
        assert!(matches!(
            ChainVerifier::from_public_key_hex("not-hex"),
            Err(EvidenceError::InvalidKey(_))
        ));
        assert!(matches!(
            ChainVerifier::from_public_key_hex("abcd"),
            Err(EvidenceError::InvalidKey(_))
        ));
    }

    #[test]
    fn verify_chain_reports_reordering() {
        let signer = EvidenceSigner::from_secret_bytes(&[3u8; 32]);
        let first = signed_entry(&signer, "ev_a", "");
        let second = signed_entry(&signer, "ev_b", "ev_a");
        let third = signed_entry(&signer, "ev_c", "ev_b");

        let verifier = signer.verifier();
        assert!(verifier
            .verify_chain(&[first.clone(), second.clone(), third.clone()])
            .valid);

        let report = verifier.verify_chain(&[first, third, second]);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("broken link")));
        assert!(report.errors.iter().any(|e| e.contains("chain hash mismatch")));
    }

    #[test]
    fn verify_chain_reports_duplicates_and_bad_genesis() {
        let signer = EvidenceSigner::from_secret_bytes(&[4u8; 32]);
        let orphan = signed_entry(&signer, "ev_b", "ev_a");
        let report = signer.verifier().verify_chain(&[orphan.clone(), orphan]);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("first entry names")));
        assert!(report.errors.iter().any(|e| e.contains("duplicate")));
    }

    #[test]
    fn empty_chain_is_valid() {
        let signer = EvidenceSigner::generate();
        let report = signer.verifier().verify_chain(&[]);
        assert_eq!(report, ChainVerification::ok(0));
    }

    #[test]
    fn export_count_mismatch_is_reported() {
        let signer = EvidenceSigner::from_secret_bytes(&[5u8; 32]);
        let export = ChainExport {
            public_key: signer.public_key_hex(),
            entries: vec![signed_entry(&signer, "ev_a", "")],
            entry_count: 2,
            exported_at: Utc::now(),
        };
        let report = signer.verifier().verify_export(&export);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn debug_output_hides_secret() {
        let signer = EvidenceSigner::from_secret_bytes(&[9u8; 32]);
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains(&signer.public_key_hex()));
        assert!(!rendered.contains(&hex::encode([9u8; 32])));
    }
}
