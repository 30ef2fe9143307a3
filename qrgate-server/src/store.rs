//! Store factory for creating rate limiter instances
//!
//! # Store Types
//!
//! ## Periodic Store
//! - Cleanups occur at fixed intervals
//! - Predictable memory usage patterns
//!
//! ## Probabilistic Store
//! - Cleanups run on a deterministic 1-in-N operation schedule
//! - Lower overhead on quiet servers
//!
//! Both are also swept by the actor's timer, so idle clients are reclaimed
//! even when no writes arrive.

use crate::actor::{LimiterSettings, RateLimiterActor, RateLimiterHandle};
use crate::config::{StoreConfig, StoreType};
use crate::metrics::Metrics;
use qrgate::{PeriodicStore, ProbabilisticStore};
use std::sync::Arc;
use std::time::Duration;

/// Create a rate limiter actor with the configured store
pub fn create_rate_limiter(
    config: &StoreConfig,
    settings: LimiterSettings,
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> RateLimiterHandle {
    match config.store_type {
        StoreType::Periodic => {
            let store = PeriodicStore::builder()
                .capacity(config.capacity)
                .cleanup_interval(Duration::from_secs(config.cleanup_interval))
                .build();
            RateLimiterActor::spawn_periodic(buffer_size, store, settings, metrics)
        }
        StoreType::Probabilistic => {
            let store = ProbabilisticStore::builder()
                .capacity(config.capacity)
                .cleanup_probability(config.cleanup_probability)
                .build();
            RateLimiterActor::spawn_probabilistic(buffer_size, store, settings, metrics)
        }
    }
}
