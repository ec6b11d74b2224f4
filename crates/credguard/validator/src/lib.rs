//! Credguard rule validator.
//!
//! Turns a cached rule set and a proposed action into a decision: which rules
//! applied, the combined outcome and the execution method it permits. The
//! rate-limit capability answers the separate question of whether an action
//! may run *now*.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod rate_limit;
mod validator;

pub use error::{ValidatorError, ValidatorResult};
pub use rate_limit::{InMemoryRateLimiter, RateLimitPolicy, RateLimiter};
pub use validator::RuleValidator;
