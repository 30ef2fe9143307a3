use super::{Store, Window};
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CLEANUP_PROBABILITY: u64 = 1000;
// Knuth multiplicative hash, spreads sweeps evenly over the operation count
const SCATTER_MULTIPLIER: u64 = 2_654_435_761;

/// Probabilistic cleanup store implementation
///
/// Each write has a 1-in-N chance of sweeping expired windows. The schedule
/// is derived from the operation count, so it is deterministic and needs no
/// random number generator.
///
/// # Example
///
/// ```
/// use qrgate::{ProbabilisticStore, RateLimiter};
///
/// let store = ProbabilisticStore::builder()
///     .capacity(100_000)
///     .cleanup_probability(10_000) // 1 in 10,000 writes
///     .build();
/// let mut limiter = RateLimiter::new(store);
/// ```
pub struct ProbabilisticStore {
    data: HashMap<String, (Window, SystemTime)>,
    operations_count: u64,
    cleanup_probability: u64,
}

/// Builder for configuring a ProbabilisticStore
pub struct ProbabilisticStoreBuilder {
    capacity: usize,
    cleanup_probability: u64,
}

impl ProbabilisticStore {
    /// Create a new ProbabilisticStore with default configuration
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder for configuring a ProbabilisticStore
    pub fn builder() -> ProbabilisticStoreBuilder {
        ProbabilisticStoreBuilder::default()
    }

    fn maybe_cleanup(&mut self, now: SystemTime) {
        self.operations_count = self.operations_count.wrapping_add(1);

        let hash = self.operations_count.wrapping_mul(SCATTER_MULTIPLIER);
        if hash % self.cleanup_probability == 0 {
            self.purge_expired(now);
        }
    }
}

impl Default for ProbabilisticStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for ProbabilisticStore {
    fn compare_and_swap_with_ttl(
        &mut self,
        key: &str,
        old: Window,
        new: Window,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<bool, String> {
        self.maybe_cleanup(now);

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
        self.maybe_cleanup(now);

        match self.data.get(key) {
            Some((_, expiry)) if *expiry > now => Ok(false),
            _ => {
                self.data.insert(key.to_string(), (value, now + ttl));
                Ok(true)
            }
        }
    }

    fn purge_expired(&mut self, now: SystemTime) -> usize {
        let before_count = self.data.len();
        self.data.retain(|_, (_, expiry)| *expiry > now);
        before_count.saturating_sub(self.data.len())
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl Default for ProbabilisticStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cleanup_probability: DEFAULT_CLEANUP_PROBABILITY,
        }
    }
}

impl ProbabilisticStoreBuilder {
    /// Set the expected capacity (number of unique keys)
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sweep on roughly one in `n` writes (values below 1 are treated as 1)
    pub fn cleanup_probability(mut self, n: u64) -> Self {
        self.cleanup_probability = n.max(1);
        self
    }

    /// Build the ProbabilisticStore with the configured settings
    pub fn build(self) -> ProbabilisticStore {
        ProbabilisticStore {
            data: HashMap::with_capacity(
                (self.capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize,
            ),
            operations_count: 0,
            cleanup_probability: self.cleanup_probability,
        }
    }
}
