use anyhow::{Context, Result};
use qrgate::audit::{AuditLog, FileStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use qrgate_server::actor::LimiterSettings;
use qrgate_server::config::Config;
use qrgate_server::engines::Engines;
use qrgate_server::journal::JournalActor;
use qrgate_server::metrics::Metrics;
use qrgate_server::orchestrator::{Orchestrator, OrchestratorSettings};
use qrgate_server::store;
use qrgate_server::transport::{
    Transport,
    http::{HttpOptions, HttpTransport},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("qrgate={}", config.log_level).parse()?)
                .add_directive(format!("qrgate_server={}", config.log_level).parse()?),
        )
        .init();

    let metrics = Arc::new(Metrics::new());

    // Open the operation log, recovering from a torn final line if needed
    let audit_store = FileStore::open(&config.audit.path).with_context(|| {
        format!(
            "Failed to open operation log at {}",
            config.audit.path.display()
        )
    })?;
    let audit_log = AuditLog::new(audit_store)?;
    tracing::info!(
        path = %config.audit.path.display(),
        entries = audit_log.len(),
        "Operation log opened"
    );
    let (journal, journal_task) = JournalActor::spawn(config.buffer_size, audit_log);

    // Create the rate limiter actor with the configured store
    let limiter = store::create_rate_limiter(
        &config.store,
        LimiterSettings {
            policy: config.limit.policy(),
            sweep_interval: Duration::from_secs(config.store.cleanup_interval),
        },
        config.buffer_size,
        Arc::clone(&metrics),
    );

    let orchestrator = Orchestrator::new(
        limiter,
        journal,
        Engines::detect(),
        metrics,
        OrchestratorSettings {
            default_languages: config.engines.ocr_languages.clone(),
            engine_timeout: config.engines.timeout(),
        },
    );

    let mut transport_tasks = JoinSet::new();

    {
        let http = &config.http;
        let transport = HttpTransport::new(
            &http.host,
            http.port,
            HttpOptions {
                trust_forwarded_for: http.trust_forwarded_for,
                audit_access: http.audit_access,
                max_upload_bytes: http.max_upload_bytes,
            },
        )?;
        let host = http.host.clone();
        let port = http.port;

        transport_tasks.spawn(async move {
            tracing::info!("Starting HTTP transport on {}:{}", host, port);
            transport.start(orchestrator).await
        });
    }

    tracing::info!(
        "qrgate started: {} calls per {}s per client and endpoint, store type {:?}",
        config.limit.requests,
        config.limit.window_secs,
        config.store.store_type
    );

    while let Some(result) = transport_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {
                tracing::info!("Transport task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Transport task failed: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Transport task panicked: {}", e);
                return Err(anyhow::anyhow!("Transport task panicked"));
            }
        }
    }

    // Every orchestrator handle is gone now; wait for the log to be synced
    if let Err(e) = journal_task.await {
        tracing::error!("Journal task panicked: {}", e);
    }

    Ok(())
}
