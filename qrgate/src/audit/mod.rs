//! Append-only operation log
//!
//! Every generate, decode and OCR attempt, admitted or rejected, becomes
//! exactly one [`LogEntry`]. Entries are never changed or removed once
//! written. The log is the single source of truth for stats and export:
//!
//! - [`entry`]: the entry model (actions, details, filters)
//! - [`store`]: durable ([`FileStore`]) and in-memory ([`MemoryStore`]) backends
//! - [`stats`]: per-action aggregation
//! - [`export`]: CSV export
//!
//! [`AuditLog`] ties a store to the rules every writer must follow:
//! timestamps are assigned at append time and never go backwards in log
//! order, so querying "in timestamp order" and "in append order" agree.

pub mod entry;
pub mod export;
pub mod stats;
pub mod store;

pub use entry::{Action, Detail, LogEntry, LogFilter, PendingEntry, UnknownAction};
pub use export::{CSV_HEADER, to_csv, write_csv};
pub use stats::{Bucket, BucketCounts, StatsSummary, summarize, summarize_by};
pub use store::{AuditStore, FileStore, MemoryStore};

use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;
use std::io;

/// Errors raised by audit stores and exporters
#[derive(Debug)]
pub enum AuditError {
    /// Reading, writing or syncing the log failed
    Io(io::Error),
    /// An entry could not be encoded
    Encode(String),
    /// A stored line is not a valid entry
    Corrupt { line: usize, reason: String },
    /// CSV export failed
    Csv(String),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Io(e) => write!(f, "audit log I/O error: {e}"),
            AuditError::Encode(msg) => write!(f, "failed to encode audit entry: {msg}"),
            AuditError::Corrupt { line, reason } => {
                write!(f, "corrupt audit log at line {line}: {reason}")
            }
            AuditError::Csv(msg) => write!(f, "CSV export failed: {msg}"),
        }
    }
}

impl Error for AuditError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AuditError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AuditError {
    fn from(e: io::Error) -> Self {
        AuditError::Io(e)
    }
}

impl From<csv::Error> for AuditError {
    fn from(e: csv::Error) -> Self {
        AuditError::Csv(e.to_string())
    }
}

/// Operation log over an [`AuditStore`]
///
/// # Example
///
/// ```
/// use qrgate::audit::{Action, AuditLog, Detail, LogFilter, MemoryStore, PendingEntry};
/// use chrono::Utc;
///
/// let mut log = AuditLog::new(MemoryStore::new()).unwrap();
/// let entry = log
///     .record(
///         PendingEntry::new(
///             Action::Decode,
///             "198.51.100.4",
///             Detail::Decoded { payload_len: 42, compressed: true },
///         ),
///         Utc::now(),
///     )
///     .unwrap();
///
/// let all = log.query(&LogFilter::default()).unwrap();
/// assert_eq!(all, vec![entry]);
/// ```
pub struct AuditLog<S: AuditStore> {
    store: S,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<S: AuditStore> AuditLog<S> {
    /// Wrap a store, resuming after its newest entry
    pub fn new(store: S) -> Result<Self, AuditError> {
        let last_timestamp = store.last_timestamp()?;
        Ok(AuditLog {
            store,
            last_timestamp,
        })
    }

    /// Stamp and durably append one entry
    ///
    /// `now` is clamped to the newest stored timestamp so that log order is
    /// always timestamp order, even if the wall clock steps backwards.
    pub fn record(
        &mut self,
        pending: PendingEntry,
        now: DateTime<Utc>,
    ) -> Result<LogEntry, AuditError> {
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        let entry = pending.stamp(timestamp);
        self.store.append(&entry)?;
        self.last_timestamp = Some(timestamp);
        Ok(entry)
    }

    /// Entries matching `filter`, oldest first
    pub fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, AuditError> {
        self.store.query(filter)
    }

    /// Per-action counts over the whole log
    pub fn summarize(&self) -> Result<StatsSummary, AuditError> {
        Ok(summarize(&self.store.query(&LogFilter::default())?))
    }

    /// Per-action counts, also broken down by time bucket
    pub fn summarize_by(&self, bucket: Bucket) -> Result<StatsSummary, AuditError> {
        Ok(summarize_by(
            &self.store.query(&LogFilter::default())?,
            bucket,
        ))
    }

    /// The full log as CSV
    pub fn export_csv(&self) -> Result<Vec<u8>, AuditError> {
        to_csv(&self.store.query(&LogFilter::default())?)
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Flush anything the store still buffers
    pub fn sync(&mut self) -> Result<(), AuditError> {
        self.store.sync()
    }
}
