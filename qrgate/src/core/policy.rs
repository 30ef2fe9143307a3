//! Window policy for the fixed-window limiter
//!
//! A [`WindowPolicy`] says how many calls one window admits and how long a
//! window lasts. Windows are kept in the store for twice their length so a
//! client that just rolled over still has its previous window reclaimed by
//! the sweep rather than lingering forever.

use std::time::Duration;

const DEFAULT_LIMIT: u64 = 5;
const DEFAULT_PERIOD_SECS: u64 = 60;
const RETENTION_FACTOR: u32 = 2;

/// Fixed-window admission policy
///
/// # Examples
///
/// ```
/// use qrgate::WindowPolicy;
/// use std::time::Duration;
///
/// // 5 calls per minute (the service default)
/// let policy = WindowPolicy::per_minute(5);
/// assert_eq!(policy.limit(), 5);
/// assert_eq!(policy.period(), Duration::from_secs(60));
/// assert_eq!(policy.retention(), Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    limit: u64,
    period: Duration,
}

impl WindowPolicy {
    /// Creates a policy admitting `limit` calls per `period`
    pub fn new(limit: u64, period: Duration) -> Self {
        WindowPolicy { limit, period }
    }

    /// `n` calls per second
    pub fn per_second(n: u64) -> Self {
        Self::new(n, Duration::from_secs(1))
    }

    /// `n` calls per minute
    pub fn per_minute(n: u64) -> Self {
        Self::new(n, Duration::from_secs(60))
    }

    /// `n` calls per hour
    pub fn per_hour(n: u64) -> Self {
        Self::new(n, Duration::from_secs(3600))
    }

    /// Maximum number of admitted calls in one window
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of one window
    pub fn period(&self) -> Duration {
        self.period
    }

    /// How long a window stays in the store, measured from its start
    pub fn retention(&self) -> Duration {
        self.period.saturating_mul(RETENTION_FACTOR)
    }

    /// A policy with a zero limit or zero period cannot admit anything
    pub fn is_valid(&self) -> bool {
        self.limit > 0 && !self.period.is_zero()
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, Duration::from_secs(DEFAULT_PERIOD_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = WindowPolicy::default();
        assert_eq!(policy.limit(), 5);
        assert_eq!(policy.period(), Duration::from_secs(60));
        assert!(policy.is_valid());
    }

    #[test]
    fn test_constructors() {
        assert_eq!(WindowPolicy::per_second(10).period(), Duration::from_secs(1));
        assert_eq!(WindowPolicy::per_hour(100).period(), Duration::from_secs(3600));
        assert_eq!(WindowPolicy::per_hour(100).limit(), 100);
    }

    #[test]
    fn test_retention_is_twice_the_period() {
        let policy = WindowPolicy::new(3, Duration::from_secs(45));
        assert_eq!(policy.retention(), Duration::from_secs(90));
    }

    #[test]
    fn test_invalid_policies() {
        assert!(!WindowPolicy::new(0, Duration::from_secs(60)).is_valid());
        assert!(!WindowPolicy::new(5, Duration::ZERO).is_valid());
    }
}
