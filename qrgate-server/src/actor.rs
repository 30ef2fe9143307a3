//! Rate limiter actor
//!
//! One task owns the [`RateLimiter`]; everyone else talks to it through a
//! cloneable [`RateLimiterHandle`]. Checks are processed one at a time, so
//! concurrent callers can never jointly push a window past its limit. The
//! same task sweeps expired windows on a timer.

use crate::metrics::Metrics;
use crate::types::{AdmissionRequest, AdmissionResponse};
use anyhow::Result;
use qrgate::{LimitError, PeriodicStore, ProbabilisticStore, RateLimiter, WindowPolicy, WindowResult};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Message types for the rate limiter actor
pub enum RateLimiterMessage {
    Check {
        request: AdmissionRequest,
        response_tx: oneshot::Sender<Result<AdmissionResponse>>,
    },
    TrackedKeys {
        response_tx: oneshot::Sender<usize>,
    },
}

/// Handle to communicate with the rate limiter actor
#[derive(Clone)]
pub struct RateLimiterHandle {
    tx: mpsc::Sender<RateLimiterMessage>,
}

impl RateLimiterHandle {
    /// Check and count one call
    pub async fn check(&self, request: AdmissionRequest) -> Result<AdmissionResponse> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(RateLimiterMessage::Check {
                request,
                response_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Rate limiter actor has shut down"))?;

        response_rx
            .await
            .map_err(|_| anyhow::anyhow!("Rate limiter actor dropped response channel"))?
    }

    /// Number of windows currently held by the store
    pub async fn tracked_keys(&self) -> Result<usize> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(RateLimiterMessage::TrackedKeys { response_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Rate limiter actor has shut down"))?;

        response_rx
            .await
            .map_err(|_| anyhow::anyhow!("Rate limiter actor dropped response channel"))
    }
}

/// Settings shared by every actor flavor
#[derive(Debug, Clone, Copy)]
pub struct LimiterSettings {
    /// Window applied to every endpoint class
    pub policy: WindowPolicy,
    /// How often expired windows are swept
    pub sweep_interval: Duration,
}

/// The rate limiter actor
pub struct RateLimiterActor;

impl RateLimiterActor {
    /// Spawn a new rate limiter actor with a periodic store
    pub fn spawn_periodic(
        buffer_size: usize,
        store: PeriodicStore,
        settings: LimiterSettings,
        metrics: Arc<Metrics>,
    ) -> RateLimiterHandle {
        let (tx, rx) = mpsc::channel(buffer_size);

        tokio::spawn(async move {
            let store_type = StoreType::Periodic(RateLimiter::new(store));
            run_actor(rx, store_type, settings, metrics).await;
        });

        RateLimiterHandle { tx }
    }

    /// Spawn a new rate limiter actor with a probabilistic store
    pub fn spawn_probabilistic(
        buffer_size: usize,
        store: ProbabilisticStore,
        settings: LimiterSettings,
        metrics: Arc<Metrics>,
    ) -> RateLimiterHandle {
        let (tx, rx) = mpsc::channel(buffer_size);

        tokio::spawn(async move {
            let store_type = StoreType::Probabilistic(RateLimiter::new(store));
            run_actor(rx, store_type, settings, metrics).await;
        });

        RateLimiterHandle { tx }
    }
}

/// Internal enum to handle different store types
enum StoreType {
    Periodic(RateLimiter<PeriodicStore>),
    Probabilistic(RateLimiter<ProbabilisticStore>),
}

impl StoreType {
    fn check(
        &mut self,
        key: &str,
        policy: WindowPolicy,
        timestamp: SystemTime,
    ) -> Result<(bool, WindowResult), LimitError> {
        match self {
            StoreType::Periodic(limiter) => limiter.check(key, policy, timestamp),
            StoreType::Probabilistic(limiter) => limiter.check(key, policy, timestamp),
        }
    }

    fn sweep(&mut self, now: SystemTime) -> usize {
        match self {
            StoreType::Periodic(limiter) => limiter.sweep(now),
            StoreType::Probabilistic(limiter) => limiter.sweep(now),
        }
    }

    fn tracked_keys(&self) -> usize {
        match self {
            StoreType::Periodic(limiter) => limiter.tracked_keys(),
            StoreType::Probabilistic(limiter) => limiter.tracked_keys(),
        }
    }
}

async fn run_actor(
    mut rx: mpsc::Receiver<RateLimiterMessage>,
    mut store_type: StoreType,
    settings: LimiterSettings,
    metrics: Arc<Metrics>,
) {
    let mut sweep = tokio::time::interval(settings.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    sweep.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    RateLimiterMessage::Check {
                        request,
                        response_tx,
                    } => {
                        let response = handle_check(&mut store_type, settings.policy, request);
                        // Ignore send errors - receiver may have gone away
                        let _ = response_tx.send(response);
                    }
                    RateLimiterMessage::TrackedKeys { response_tx } => {
                        let _ = response_tx.send(store_type.tracked_keys());
                    }
                }
            }
            _ = sweep.tick() => {
                let removed = store_type.sweep(SystemTime::now());
                metrics.record_evictions(removed);
                metrics.update_active_windows(store_type.tracked_keys());
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired rate windows");
                }
            }
        }
    }

    tracing::info!("Rate limiter actor shutting down");
}

fn handle_check(
    store_type: &mut StoreType,
    policy: WindowPolicy,
    request: AdmissionRequest,
) -> Result<AdmissionResponse> {
    let (allowed, result) = store_type
        .check(&request.key(), policy, request.timestamp)
        .map_err(|e| anyhow::anyhow!("Rate limit check failed: {}", e))?;

    if !allowed {
        tracing::debug!(
            class = %request.class,
            client = %request.client_key,
            retry_after = ?result.retry_after,
            "Rate limit exceeded"
        );
    }

    Ok(AdmissionResponse::from((allowed, result)))
}
