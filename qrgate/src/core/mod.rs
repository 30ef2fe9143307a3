//! Rate limiting core
//!
//! This module contains the fixed-window admission control:
//! - [`policy`]: how many calls a window admits and how long it lasts
//! - [`rate_limiter`]: the limiter that opens, counts and resets windows
//! - [`store`]: storage backends for per-key window state

pub mod policy;
pub mod rate_limiter;
pub mod store;
#[cfg(test)]
mod tests;

pub use policy::WindowPolicy;
pub use rate_limiter::{RateLimiter, WindowResult};
pub use store::{
    PeriodicStore, PeriodicStoreBuilder, ProbabilisticStore, ProbabilisticStoreBuilder, Store,
    Window,
};

use std::error::Error;
use std::fmt;

/// Errors that can occur during an admission check
///
/// # Variants
///
/// - [`InvalidPolicy`](LimitError::InvalidPolicy): The policy admits nothing (zero limit or zero period)
/// - [`Internal`](LimitError::Internal): The store failed or kept losing update races
///
/// # Example
///
/// ```
/// use qrgate::{LimitError, PeriodicStore, RateLimiter, WindowPolicy};
/// use std::time::{Duration, SystemTime};
///
/// let mut limiter = RateLimiter::new(PeriodicStore::new());
/// let policy = WindowPolicy::new(0, Duration::from_secs(60));
///
/// match limiter.check("key", policy, SystemTime::now()) {
///     Err(LimitError::InvalidPolicy) => println!("policy rejected"),
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    /// The policy limit or period is zero
    InvalidPolicy,
    /// An internal error occurred
    Internal(String),
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitError::InvalidPolicy => write!(f, "invalid window policy"),
            LimitError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl Error for LimitError {}
