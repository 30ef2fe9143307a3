//! Audit log storage backends

use super::AuditError;
use super::entry::{LogEntry, LogFilter};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Storage for audit entries
///
/// Implementations keep entries in append order and never modify or drop
/// an entry once `append` has returned `Ok`.
pub trait AuditStore {
    /// Durably append one entry
    fn append(&mut self, entry: &LogEntry) -> Result<(), AuditError>;

    /// Entries matching `filter`, in append order
    fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, AuditError>;

    /// Number of stored entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of the newest entry
    fn last_timestamp(&self) -> Result<Option<DateTime<Utc>>, AuditError>;

    /// Flush anything still buffered
    fn sync(&mut self) -> Result<(), AuditError>;
}

/// In-memory store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<LogEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryStore {
    fn append(&mut self, entry: &LogEntry) -> Result<(), AuditError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, AuditError> {
        Ok(filter.apply(&self.entries))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn last_timestamp(&self) -> Result<Option<DateTime<Utc>>, AuditError> {
        Ok(self.entries.last().map(|entry| entry.timestamp))
    }

    fn sync(&mut self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// JSON Lines file store
///
/// One entry per line. Each append is a single write followed by
/// `sync_data`, so an entry is on disk before `append` returns. The whole
/// log is also kept in memory for queries.
///
/// On open, an unterminated final line is treated as a write torn by a
/// crash and cut off; any other unreadable line is reported as
/// [`AuditError::Corrupt`].
///
/// # Example
///
/// ```no_run
/// use qrgate::audit::{AuditLog, FileStore};
///
/// let store = FileStore::open("data/audit.jsonl").unwrap();
/// let log = AuditLog::new(store).unwrap();
/// println!("{} entries on record", log.len());
/// ```
pub struct FileStore {
    path: PathBuf,
    file: File,
    // Length of the file covering complete lines only
    committed_len: u64,
    // A failed append left bytes past `committed_len` that are not yet cut
    needs_repair: bool,
    entries: Vec<LogEntry>,
}

impl FileStore {
    /// Open or create the log at `path`, loading every stored entry
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let (entries, committed_len) = parse_lines(&contents)?;
        if committed_len < contents.len() as u64 {
            file.set_len(committed_len)?;
            file.sync_data()?;
        }

        Ok(FileStore {
            path,
            file,
            committed_len,
            needs_repair: false,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut the file back to its last complete line
    fn truncate_to_committed(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.sync_data()
    }
}

fn parse_lines(contents: &[u8]) -> Result<(Vec<LogEntry>, u64), AuditError> {
    let mut entries = Vec::new();
    let mut offset = 0;
    let mut line_number = 0;

    while offset < contents.len() {
        line_number += 1;
        let rest = &contents[offset..];
        let Some(end) = rest.iter().position(|b| *b == b'\n') else {
            // Torn tail: the writer always terminates its lines
            break;
        };

        let line = &rest[..end];
        offset += end + 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let entry = serde_json::from_slice(line).map_err(|e| AuditError::Corrupt {
            line: line_number,
            reason: e.to_string(),
        })?;
        entries.push(entry);
    }

    Ok((entries, offset as u64))
}

impl AuditStore for FileStore {
    fn append(&mut self, entry: &LogEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| AuditError::Encode(e.to_string()))?;
        line.push(b'\n');

        // Never write after a partial line
        if self.needs_repair {
            self.truncate_to_committed()?;
            self.needs_repair = false;
        }

        let written = self
            .file
            .write_all(&line)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            self.needs_repair = self.truncate_to_committed().is_err();
            return Err(AuditError::Io(e));
        }

        self.committed_len += line.len() as u64;
        self.entries.push(entry.clone());
        Ok(())
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, AuditError> {
        Ok(filter.apply(&self.entries))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn last_timestamp(&self) -> Result<Option<DateTime<Utc>>, AuditError> {
        Ok(self.entries.last().map(|entry| entry.timestamp))
    }

    fn sync(&mut self) -> Result<(), AuditError> {
        self.file.sync_all()?;
        Ok(())
    }
}
