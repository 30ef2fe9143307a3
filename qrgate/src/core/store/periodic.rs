use super::{Store, Window};
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Fixed-interval cleanup store implementation
///
/// Expired windows are swept out at regular, predictable intervals. The
/// interval is checked on every write, so an idle store does no work; the
/// server additionally calls [`Store::purge_expired`] from a timer.
///
/// # Example
///
/// ```
/// use qrgate::{PeriodicStore, RateLimiter};
///
/// // Sweep expired windows every 5 minutes
/// let store = PeriodicStore::builder()
///     .cleanup_interval(std::time::Duration::from_secs(300))
///     .build();
/// let mut limiter = RateLimiter::new(store);
/// ```
pub struct PeriodicStore {
    data: HashMap<String, (Window, SystemTime)>,
    // Track when next cleanup is needed
    next_cleanup: SystemTime,
    cleanup_interval: Duration,
    // Number of entries removed by the last sweep
    expired_count: usize,
}

/// Builder for configuring a PeriodicStore
///
/// # Example
///
/// ```
/// use qrgate::PeriodicStore;
/// use std::time::Duration;
///
/// let store = PeriodicStore::builder()
///     .capacity(100_000)
///     .cleanup_interval(Duration::from_secs(120))
///     .build();
/// ```
pub struct PeriodicStoreBuilder {
    capacity: usize,
    cleanup_interval: Duration,
}

impl PeriodicStore {
    /// Create a new PeriodicStore with default configuration
    ///
    /// Uses a default capacity of 1000 keys and a cleanup interval of 60 seconds.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new PeriodicStore sized for `capacity` keys
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(
            capacity,
            Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        )
    }

    /// Create a new builder for configuring a PeriodicStore
    pub fn builder() -> PeriodicStoreBuilder {
        PeriodicStoreBuilder::default()
    }

    fn with_config(capacity: usize, cleanup_interval: Duration) -> Self {
        PeriodicStore {
            data: HashMap::with_capacity((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize),
            next_cleanup: SystemTime::now() + cleanup_interval,
            cleanup_interval,
            expired_count: 0,
        }
    }

    #[cfg(test)]
    pub fn expired_count(&self) -> usize {
        self.expired_count
    }

    fn maybe_clean_expired(&mut self, now: SystemTime) {
        if now >= self.next_cleanup {
            self.purge_expired(now);
        }
    }
}

impl Default for PeriodicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for PeriodicStore {
    fn compare_and_swap_with_ttl(
        &mut self,
        key: &str,
        old: Window,
        new: Window,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<bool, String> {
        // Only clean periodically, not on every operation
        self.maybe_clean_expired(now);

        match self.data.get_mut(key) {
            Some((_, expiry)) if *expiry <= now => Ok(false),
            Some((current, expiry)) if *current == old => {
                *current = new;
                *expiry = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get(&self, key: &str, now: SystemTime) -> Result<Option<Window>, String> {
        match self.data.get(key) {
            Some((window, expiry)) if *expiry > now => Ok(Some(*window)),
            _ => Ok(None),
        }
    }

    fn set_if_not_exists_with_ttl(
        &mut self,
        key: &str,
        value: Window,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<bool, String> {
        self.maybe_clean_expired(now);

        match self.data.get(key) {
            Some((_, expiry)) if *expiry > now => Ok(false),
            // Missing or expired
            _ => {
                self.data.insert(key.to_string(), (value, now + ttl));
                Ok(true)
            }
        }
    }

    fn purge_expired(&mut self, now: SystemTime) -> usize {
        let before_count = self.data.len();
        self.data.retain(|_, (_, expiry)| *expiry > now);
        self.expired_count = before_count.saturating_sub(self.data.len());
        self.next_cleanup = now + self.cleanup_interval;
        self.expired_count
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl Default for PeriodicStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl PeriodicStoreBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected capacity (number of unique keys)
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the interval between sweeps
    ///
    /// Shorter intervals keep memory tighter under client churn at the cost
    /// of more frequent full scans.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the PeriodicStore with the configured settings
    pub fn build(self) -> PeriodicStore {
        PeriodicStore::with_config(self.capacity, self.cleanup_interval)
    }
}
