use crate::CacheResult;
use async_trait::async_trait;
use credguard_types::RuleSet;
use std::time::Duration;

/// Default time-to-live for cached rule sets (30 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Longest accepted time-to-live (10 years).
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Storage interface for compliance rule sets.
///
/// Readers (`get`, `list`, `len`) may run concurrently with each other;
/// writers (`store`, `invalidate`, `clean_expired`, `clear`) exclude readers
/// and each other.
#[async_trait]
pub trait RuleCache: Send + Sync {
    /// Insert or replace the rule set for its site and return the stored copy.
    ///
    /// Derives the identifier when unset and always overwrites the expiry with
    /// `now + ttl`, ignoring whatever the caller supplied.
    async fn store(&self, rule_set: RuleSet) -> CacheResult<RuleSet>;

    /// Live (unexpired) rule set for `site`, if any.
    async fn get(&self, site: &str) -> CacheResult<Option<RuleSet>>;

    /// Rule sets matching `site_filter` exactly (`None` or empty = all sites).
    async fn list(&self, site_filter: Option<&str>, include_expired: bool)
        -> CacheResult<Vec<RuleSet>>;

    /// Remove the entry for `site`. Returns whether an entry was present.
    async fn invalidate(&self, site: &str) -> CacheResult<bool>;

    /// Remove every expired entry and return how many were removed.
    async fn clean_expired(&self) -> CacheResult<usize>;

    /// Remove every entry and return how many were removed.
    async fn clear(&self) -> CacheResult<usize>;

    /// Number of entries currently held, expired ones included.
    async fn len(&self) -> CacheResult<usize>;

    /// Time-to-live applied by the next `store`.
    fn ttl(&self) -> Duration;

    /// Change the time-to-live for future stores. Existing expiries are kept.
    fn set_ttl(&self, ttl: Duration) -> CacheResult<()>;
}

/// Whether a rule set has passed its own expiry. Works on sets that are not
/// currently cached.
pub fn is_expired(rule_set: &RuleSet) -> bool {
    rule_set.is_expired()
}
