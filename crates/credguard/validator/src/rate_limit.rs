//! Per-site, per-action-type counting windows.

use crate::{ValidatorError, ValidatorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// At most `max_actions` recorded actions per `(site, action_type)` within
/// any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_actions: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_actions: u32, window: Duration) -> ValidatorResult<Self> {
        if window.is_zero() {
            return Err(ValidatorError::InvalidPolicy(
                "rate window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_actions,
            window,
        })
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_actions: 5,
            window: Duration::from_secs(3600),
        }
    }
}

/// Stateful quota check consulted before an action runs.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether one more action would exceed the window. Does not record.
    async fn would_exceed(&self, site: &str, action_type: &str) -> ValidatorResult<bool>;

    /// Count one performed action.
    async fn record(&self, site: &str, action_type: &str) -> ValidatorResult<()>;

    /// Check and count in one step: returns `true` and records the action
    /// when it fits the window, `false` (recording nothing) when it does not.
    /// Concurrent callers never admit more than the window allows.
    async fn try_acquire(&self, site: &str, action_type: &str) -> ValidatorResult<bool>;

    /// Drop windows with no action left inside them. Returns how many were
    /// dropped.
    async fn prune_expired(&self) -> ValidatorResult<usize>;

    /// Replace the policy. Recorded history is kept and judged by the new window.
    fn set_policy(&self, policy: RateLimitPolicy) -> ValidatorResult<()>;

    fn policy(&self) -> RateLimitPolicy;
}

type WindowKey = (String, String);

/// Sliding-window limiter held in process memory.
pub struct InMemoryRateLimiter {
    windows: RwLock<HashMap<WindowKey, VecDeque<Instant>>>,
    policy: RwLock<RateLimitPolicy>,
}

impl InMemoryRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            policy: RwLock::new(policy),
        }
    }

    fn key(site: &str, action_type: &str) -> WindowKey {
        (site.to_ascii_lowercase(), action_type.to_string())
    }

    fn current_policy(&self) -> ValidatorResult<RateLimitPolicy> {
        self.policy
            .read()
            .map(|guard| *guard)
            .map_err(|_| ValidatorError::Backend("rate policy lock poisoned".to_string()))
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

fn live_count(history: &VecDeque<Instant>, window: Duration, now: Instant) -> usize {
    history
        .iter()
        .filter(|at| now.saturating_duration_since(**at) < window)
        .count()
}

/// Histories are appended in time order, so expired stamps sit at the front.
fn trim_expired(history: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while history
        .front()
        .is_some_and(|at| now.saturating_duration_since(*at) >= window)
    {
        history.pop_front();
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn would_exceed(&self, site: &str, action_type: &str) -> ValidatorResult<bool> {
        let policy = self.current_policy()?;
        let guard = self
            .windows
            .read()
            .map_err(|_| ValidatorError::Backend("rate window lock poisoned".to_string()))?;
        let used = guard
            .get(&Self::key(site, action_type))
            .map(|history| live_count(history, policy.window, Instant::now()))
            .unwrap_or(0);
        Ok(used >= policy.max_actions as usize)
    }

    async fn record(&self, site: &str, action_type: &str) -> ValidatorResult<()> {
        let policy = self.current_policy()?;
        let now = Instant::now();
        let mut guard = self
            .windows
            .write()
            .map_err(|_| ValidatorError::Backend("rate window lock poisoned".to_string()))?;
        let history = guard.entry(Self::key(site, action_type)).or_default();
        trim_expired(history, policy.window, now);
        history.push_back(now);
        let used = history.len();
        drop(guard);

        tracing::debug!(site = %site, action_type = %action_type, used, "Recorded action");
        Ok(())
    }

    async fn try_acquire(&self, site: &str, action_type: &str) -> ValidatorResult<bool> {
        let policy = self.current_policy()?;
        let now = Instant::now();
        let key = Self::key(site, action_type);
        let mut guard = self
            .windows
            .write()
            .map_err(|_| ValidatorError::Backend("rate window lock poisoned".to_string()))?;

        let history = guard.entry(key.clone()).or_default();
        trim_expired(history, policy.window, now);
        let used = history.len();
        let admitted = used < policy.max_actions as usize;
        if admitted {
            history.push_back(now);
        } else if history.is_empty() {
            guard.remove(&key);
        }
        drop(guard);

        tracing::debug!(
            site = %site,
            action_type = %action_type,
            used,
            admitted,
            "Rate slot requested"
        );
        Ok(admitted)
    }

    async fn prune_expired(&self) -> ValidatorResult<usize> {
        let policy = self.current_policy()?;
        let now = Instant::now();
        let mut guard = self
            .windows
            .write()
            .map_err(|_| ValidatorError::Backend("rate window lock poisoned".to_string()))?;
        let before = guard.len();
        guard.retain(|_, history| {
            trim_expired(history, policy.window, now);
            !history.is_empty()
        });
        Ok(before - guard.len())
    }

    fn set_policy(&self, policy: RateLimitPolicy) -> ValidatorResult<()> {
        let policy = RateLimitPolicy::new(policy.max_actions, policy.window)?;
        let mut guard = self
            .policy
            .write()
            .map_err(|_| ValidatorError::Backend("rate policy lock poisoned".to_string()))?;
        *guard = policy;
        Ok(())
    }

    fn policy(&self) -> RateLimitPolicy {
        self.current_policy().unwrap_or_default()
    }
}
