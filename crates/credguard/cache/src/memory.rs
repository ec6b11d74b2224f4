//! In-memory reference implementation of [`RuleCache`].
//!
//! Deterministic and test-friendly. Entries live only as long as the process.

use crate::traits::{RuleCache, DEFAULT_TTL, MAX_TTL};
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use chrono::Utc;
use credguard_types::RuleSet;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// In-memory rule cache keyed by site.
pub struct InMemoryRuleCache {
    entries: RwLock<HashMap<String, RuleSet>>,
    ttl: RwLock<Duration>,
}

impl InMemoryRuleCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: RwLock::new(DEFAULT_TTL),
        }
    }

    /// Create a cache with an explicit time-to-live.
    pub fn with_ttl(ttl: Duration) -> CacheResult<Self> {
        let cache = Self::new();
        cache.set_ttl(ttl)?;
        Ok(cache)
    }

    fn current_ttl(&self) -> CacheResult<chrono::Duration> {
        let ttl = *self
            .ttl
            .read()
            .map_err(|_| CacheError::Backend("ttl lock poisoned".to_string()))?;
        chrono::Duration::from_std(ttl).map_err(|e| CacheError::InvalidTtl(e.to_string()))
    }
}

impl Default for InMemoryRuleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleCache for InMemoryRuleCache {
    async fn store(&self, mut rule_set: RuleSet) -> CacheResult<RuleSet> {
        if rule_set.site.trim().is_empty() {
            return Err(CacheError::InvalidRuleSet(
                "rule set site must not be empty".to_string(),
            ));
        }
        if rule_set.id.is_empty() {
            rule_set.id = rule_set.content_id();
        }

        let ttl = self.current_ttl()?;
        let now = Utc::now();
        rule_set.expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            CacheError::InvalidTtl(format!("expiry overflows for ttl {}s", ttl.num_seconds()))
        })?;

        let mut guard = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        let replaced = guard.insert(rule_set.site.clone(), rule_set.clone()).is_some();
        drop(guard);

        tracing::debug!(
            site = %rule_set.site,
            rule_set_id = %rule_set.id,
            rules = rule_set.rule_count(),
            expires_at = %rule_set.expires_at,
            replaced,
            "Stored rule set"
        );
        Ok(rule_set)
    }

    async fn get(&self, site: &str) -> CacheResult<Option<RuleSet>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        let now = Utc::now();
        Ok(guard
            .get(site)
            .filter(|rule_set| !rule_set.is_expired_at(now))
            .cloned())
    }

    async fn list(
        &self,
        site_filter: Option<&str>,
        include_expired: bool,
    ) -> CacheResult<Vec<RuleSet>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        let now = Utc::now();
        let filter = site_filter.filter(|site| !site.is_empty());

        let mut values = guard
            .values()
            .filter(|rule_set| filter.map_or(true, |site| rule_set.site == site))
            .filter(|rule_set| include_expired || !rule_set.is_expired_at(now))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.site.cmp(&b.site));
        Ok(values)
    }

    async fn invalidate(&self, site: &str) -> CacheResult<bool> {
        if site.trim().is_empty() {
            return Err(CacheError::InvalidSite("site must not be empty".to_string()));
        }
        let mut guard = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        let removed = guard.remove(site).is_some();
        tracing::debug!(site = %site, removed, "Invalidated rule set");
        Ok(removed)
    }

    async fn clean_expired(&self) -> CacheResult<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        let now = Utc::now();
        let before = guard.len();
        guard.retain(|_, rule_set| !rule_set.is_expired_at(now));
        let removed = before - guard.len();
        tracing::debug!(removed, remaining = guard.len(), "Swept expired rule sets");
        Ok(removed)
    }

    async fn clear(&self) -> CacheResult<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }

    async fn len(&self) -> CacheResult<usize> {
        let guard = self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("rule cache lock poisoned".to_string()))?;
        Ok(guard.len())
    }

    fn ttl(&self) -> Duration {
        self.ttl.read().map(|ttl| *ttl).unwrap_or(DEFAULT_TTL)
    }

    fn set_ttl(&self, ttl: Duration) -> CacheResult<()> {
        if ttl > MAX_TTL {
            return Err(CacheError::InvalidTtl(format!(
                "ttl {}s exceeds maximum {}s",
                ttl.as_secs(),
                MAX_TTL.as_secs()
            )));
        }
        let mut guard = self
            .ttl
            .write()
            .map_err(|_| CacheError::Backend("ttl lock poisoned".to_string()))?;
        *guard = ttl;
        Ok(())
    }
}
