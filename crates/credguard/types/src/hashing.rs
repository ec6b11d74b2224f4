//! One-way hashing helpers.
//!
//! All digests are BLAKE3. Identifiers are truncated, hex-encoded prefixes of
//! the full digest; credential hashes keep the full 256 bits.

/// Unit separator placed between hashed fields so `("ab", "c")` and
/// `("a", "bc")` never collide.
const FIELD_SEPARATOR: &[u8] = &[0x1f];

/// Key-derivation context for credential identifiers.
const CREDENTIAL_CONTEXT: &str = "credguard 2024 credential identifier v1";

/// Number of digest bytes kept in a rule-set identifier.
const RULE_SET_ID_BYTES: usize = 16;

/// Derive the content-addressed identifier of a rule set.
///
/// Re-ingesting unchanged terms (same site, document version and document
/// hash) always yields the same identifier.
pub fn derive_rule_set_id(site: &str, document_version: &str, document_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(site.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(document_version.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(document_hash.as_bytes());
    let digest = hasher.finalize();
    format!("crc_{}", hex::encode(&digest.as_bytes()[..RULE_SET_ID_BYTES]))
}

/// Hash a raw credential identifier.
///
/// This is the only place a raw identifier is accepted. The result is what
/// every log line and evidence entry carries.
pub fn hash_credential_id(raw: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(CREDENTIAL_CONTEXT);
    hasher.update(raw.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Hex-encoded BLAKE3 digest of arbitrary bytes.
pub fn digest_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rule_set_id_is_deterministic() {
        let a = derive_rule_set_id("example.com", "2024-01", "abc123");
        let b = derive_rule_set_id("example.com", "2024-01", "abc123");
        assert_eq!(a, b);
        assert!(a.starts_with("crc_"));
        assert_eq!(a.len(), 4 + RULE_SET_ID_BYTES * 2);
    }

    #[test]
    fn rule_set_id_changes_with_document() {
        let a = derive_rule_set_id("example.com", "2024-01", "abc123");
        let b = derive_rule_set_id("example.com", "2024-02", "abc123");
        let c = derive_rule_set_id("example.com", "2024-01", "abc124");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = derive_rule_set_id("ab", "c", "d");
        let b = derive_rule_set_id("a", "bc", "d");
        assert_ne!(a, b);
    }

    #[test]
    fn credential_hash_hides_raw_identifier() {
        let hashed = hash_credential_id("vault-item-42");
        assert_eq!(hashed.len(), 64);
        assert!(!hashed.contains("vault-item-42"));
        assert_eq!(hashed, hash_credential_id("vault-item-42"));
    }

    #[test]
    fn credential_hash_differs_from_plain_digest() {
        assert_ne!(hash_credential_id("x"), digest_hex(b"x"));
    }

    proptest! {
        #[test]
        fn distinct_credentials_hash_differently(a in "[a-z0-9]{1,24}", b in "[a-z0-9]{1,24}") {
            prop_assume!(a != b);
            prop_assert_ne!(hash_credential_id(&a), hash_credential_id(&b));
        }
    }
}
