use std::time::{Duration, SystemTime};


mod periodic;
mod probabilistic;

pub use periodic::{PeriodicStore, PeriodicStoreBuilder};
pub use probabilistic::{ProbabilisticStore, ProbabilisticStoreBuilder};

/// One fixed window: when it opened and how many calls it admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: SystemTime,
    pub count: u64,
}

/// Store trait for per-key window state
pub trait Store {
    /// Compare and swap with TTL
    fn compare_and_swap_with_ttl(
        &mut self,
        key: &str,
        old: Window,
        new: Window,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<bool, String>;

    /// Get value
    fn get(&self, key: &str, now: SystemTime) -> Result<Option<Window>, String>;

    /// Set if not exists with TTL
    fn set_if_not_exists_with_ttl(
        &mut self,
        key: &str,
        value: Window,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<bool, String>;

    /// Remove every entry whose TTL has passed, returning how many were removed
    fn purge_expired(&mut self, now: SystemTime) -> usize;

    /// Number of entries held, expired or not
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
