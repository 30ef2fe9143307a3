//! Transport layer for the QR service
//!
//! Transports accept client connections, turn protocol requests into
//! orchestrator calls and render the results. The HTTP transport is the
//! only one today; it implements [`Transport`] so `main` can run it next to
//! others in the same `JoinSet`.
//!
//! # Available Transports
//!
//! - [`http`]: multipart/JSON API served with axum

pub mod http;


use crate::orchestrator::Orchestrator;
use anyhow::Result;
use async_trait::async_trait;

/// Common interface for all transport implementations
#[async_trait]
pub trait Transport {
    /// Bind, then serve requests through `orchestrator` until shutdown
    async fn start(self, orchestrator: Orchestrator) -> Result<()>;
}
