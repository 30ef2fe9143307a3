//! Audit journal actor
//!
//! The journal owns the [`AuditLog`] on a dedicated blocking thread, since
//! every append ends in an fsync. Requests reach it through a cloneable
//! [`JournalHandle`]; appends are applied strictly one after another and
//! stamped with the time they are written.
//!
//! When the last handle is dropped the actor syncs the log and exits; await
//! the [`JoinHandle`] returned by [`JournalActor::spawn`] to know the log is
//! on disk.

use chrono::Utc;
use qrgate::audit::{
    AuditError, AuditLog, AuditStore, Bucket, LogEntry, LogFilter, PendingEntry, StatsSummary,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Failure talking to the journal
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("audit journal has shut down")]
    Closed,
}

/// Message types for the journal actor
pub enum JournalMessage {
    Record {
        entry: PendingEntry,
        response_tx: oneshot::Sender<Result<LogEntry, AuditError>>,
    },
    Query {
        filter: LogFilter,
        response_tx: oneshot::Sender<Result<Vec<LogEntry>, AuditError>>,
    },
    Summarize {
        bucket: Option<Bucket>,
        response_tx: oneshot::Sender<Result<StatsSummary, AuditError>>,
    },
    ExportCsv {
        response_tx: oneshot::Sender<Result<Vec<u8>, AuditError>>,
    },
}

/// Handle to communicate with the journal actor
#[derive(Clone)]
pub struct JournalHandle {
    tx: mpsc::Sender<JournalMessage>,
}

impl JournalHandle {
    /// Durably append one entry; returns it with its timestamp
    pub async fn record(&self, entry: PendingEntry) -> Result<LogEntry, JournalError> {
        self.request(|response_tx| JournalMessage::Record { entry, response_tx })
            .await
    }

    pub async fn query(&self, filter: LogFilter) -> Result<Vec<LogEntry>, JournalError> {
        self.request(|response_tx| JournalMessage::Query {
            filter,
            response_tx,
        })
        .await
    }

    pub async fn summarize(&self, bucket: Option<Bucket>) -> Result<StatsSummary, JournalError> {
        self.request(|response_tx| JournalMessage::Summarize {
            bucket,
            response_tx,
        })
        .await
    }

    pub async fn export_csv(&self) -> Result<Vec<u8>, JournalError> {
        self.request(|response_tx| JournalMessage::ExportCsv { response_tx })
            .await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T, AuditError>>) -> JournalMessage,
    ) -> Result<T, JournalError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(message(response_tx))
            .await
            .map_err(|_| JournalError::Closed)?;

        Ok(response_rx.await.map_err(|_| JournalError::Closed)??)
    }
}

/// The journal actor
pub struct JournalActor;

impl JournalActor {
    /// Spawn the journal on the blocking pool
    pub fn spawn<S>(buffer_size: usize, log: AuditLog<S>) -> (JournalHandle, JoinHandle<()>)
    where
        S: AuditStore + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer_size);
        let task = tokio::task::spawn_blocking(move || run_journal(rx, log));
        (JournalHandle { tx }, task)
    }
}

fn run_journal<S: AuditStore>(mut rx: mpsc::Receiver<JournalMessage>, mut log: AuditLog<S>) {
    while let Some(msg) = rx.blocking_recv() {
        match msg {
            JournalMessage::Record { entry, response_tx } => {
                let result = log.record(entry, Utc::now());
                if let Err(e) = &result {
                    tracing::error!("Failed to append audit entry: {}", e);
                }
                let _ = response_tx.send(result);
            }
            JournalMessage::Query {
                filter,
                response_tx,
            } => {
                let _ = response_tx.send(log.query(&filter));
            }
            JournalMessage::Summarize {
                bucket,
                response_tx,
            } => {
                let summary = match bucket {
                    Some(bucket) => log.summarize_by(bucket),
                    None => log.summarize(),
                };
                let _ = response_tx.send(summary);
            }
            JournalMessage::ExportCsv { response_tx } => {
                let _ = response_tx.send(log.export_csv());
            }
        }
    }

    if let Err(e) = log.sync() {
        tracing::error!("Failed to sync audit log on shutdown: {}", e);
    }
    tracing::info!(entries = log.len(), "Audit journal shutting down");
}
