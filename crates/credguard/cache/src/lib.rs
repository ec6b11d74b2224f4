//! Credguard rule cache.
//!
//! Holds at most one compliance rule set per site, each valid until an
//! expiry the cache itself assigns (`stored_at + ttl`). Expiration is lazy:
//! an expired entry stops being returned by [`RuleCache::get`] but stays in
//! place until [`RuleCache::invalidate`], [`RuleCache::clear`] or an explicit
//! [`RuleCache::clean_expired`] sweep removes it. Nothing sweeps on a timer.
//!
//! The [`RuleCache`] trait is the capability contract; [`InMemoryRuleCache`]
//! is the reference implementation. A durable backend satisfies the same
//! contract, including expiry semantics.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::InMemoryRuleCache;
pub use traits::{is_expired, RuleCache, DEFAULT_TTL, MAX_TTL};
