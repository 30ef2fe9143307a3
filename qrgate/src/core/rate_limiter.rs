//! Fixed-window rate limiter
//!
//! This module provides the [`RateLimiter`] struct. Each key owns at most
//! one open window; a window admits up to `limit` calls and is replaced by
//! a fresh one once `period` has elapsed since it opened.

use super::{LimitError, WindowPolicy, store::Store, store::Window};
use std::time::{Duration, SystemTime};

/// Result of an admission check
///
/// Describes the window of the checked key after the decision.
#[derive(Debug, Clone)]
pub struct WindowResult {
    /// Maximum number of calls admitted per window
    pub limit: u64,
    /// Calls still admitted in the current window
    pub remaining: u64,
    /// Time until the current window closes
    pub reset_after: Duration,
    /// Time to wait before the next call can be admitted (0 if admitted)
    pub retry_after: Duration,
}

/// Fixed-window rate limiter
///
/// Rejected calls never touch the store, so hammering a closed window does
/// not push its reset further out.
///
/// # Example
///
/// ```
/// use qrgate::{PeriodicStore, RateLimiter, WindowPolicy};
/// use std::time::SystemTime;
///
/// let mut limiter = RateLimiter::new(PeriodicStore::new());
/// let policy = WindowPolicy::per_minute(5);
/// let now = SystemTime::now();
///
/// for _ in 0..5 {
///     let (allowed, _) = limiter.check("ocr:10.0.0.1", policy, now).unwrap();
///     assert!(allowed);
/// }
/// let (allowed, result) = limiter.check("ocr:10.0.0.1", policy, now).unwrap();
/// assert!(!allowed);
/// assert_eq!(result.remaining, 0);
/// ```
pub struct RateLimiter<S: Store> {
    store: S,
}

impl<S: Store> RateLimiter<S> {
    /// Create a new rate limiter with the specified store
    pub fn new(store: S) -> Self {
        RateLimiter { store }
    }

    /// Check whether a call for `key` is admitted under `policy`
    ///
    /// # Returns
    ///
    /// Returns a tuple of:
    /// - `bool`: Whether the call is admitted
    /// - [`WindowResult`]: State of the key's window after the decision
    ///
    /// # Errors
    ///
    /// - [`LimitError::InvalidPolicy`]: If the policy limit or period is zero
    /// - [`LimitError::Internal`]: If the store fails
    pub fn check(
        &mut self,
        key: &str,
        policy: WindowPolicy,
        now: SystemTime,
    ) -> Result<(bool, WindowResult), LimitError> {
        if !policy.is_valid() {
            return Err(LimitError::InvalidPolicy);
        }

        let limit = policy.limit();
        let period = policy.period();

        // Retry loop with limit in case the store is shared
        const MAX_RETRIES: u32 = 10;
        let mut retries = 0;

        loop {
            let stored = self.store.get(key, now).map_err(LimitError::Internal)?;
            let open = stored.filter(|window| !has_elapsed(window, period, now));

            if let Some(window) = open {
                if window.count >= limit {
                    let reset_after = time_left(&window, period, now);
                    return Ok((
                        false,
                        WindowResult {
                            limit,
                            remaining: 0,
                            reset_after,
                            retry_after: reset_after,
                        },
                    ));
                }
            }

            let next = match open {
                Some(window) => Window {
                    start: window.start,
                    count: window.count + 1,
                },
                None => Window {
                    start: now,
                    count: 1,
                },
            };

            // Entries expire `retention` after the window opened
            let age = now.duration_since(next.start).unwrap_or(Duration::ZERO);
            let ttl = policy.retention().saturating_sub(age);

            let success = match stored {
                Some(old) => self
                    .store
                    .compare_and_swap_with_ttl(key, old, next, ttl, now)
                    .map_err(LimitError::Internal)?,
                None => self
                    .store
                    .set_if_not_exists_with_ttl(key, next, ttl, now)
                    .map_err(LimitError::Internal)?,
            };

            if !success {
                retries += 1;
                if retries >= MAX_RETRIES {
                    return Err(LimitError::Internal("Max retries exceeded".into()));
                }
                continue;
            }

            return Ok((
                true,
                WindowResult {
                    limit,
                    remaining: limit - next.count,
                    reset_after: time_left(&next, period, now),
                    retry_after: Duration::ZERO,
                },
            ));
        }
    }

    /// Drop every stored window whose retention has passed
    ///
    /// Returns the number of windows removed.
    pub fn sweep(&mut self, now: SystemTime) -> usize {
        self.store.purge_expired(now)
    }

    /// Number of windows currently held by the store
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

fn has_elapsed(window: &Window, period: Duration, now: SystemTime) -> bool {
    match now.duration_since(window.start) {
        Ok(age) => age >= period,
        // Clock went backwards: keep the window open
        Err(_) => false,
    }
}

fn time_left(window: &Window, period: Duration, now: SystemTime) -> Duration {
    (window.start + period)
        .duration_since(now)
        .unwrap_or(Duration::ZERO)
}
