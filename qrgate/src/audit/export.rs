//! CSV export

use super::AuditError;
use super::entry::LogEntry;
use chrono::SecondsFormat;
use std::io::Write;

/// Column names, in order
pub const CSV_HEADER: [&str; 4] = ["timestamp", "action", "client_key", "detail"];

/// Write `entries` as CSV with a header row, one row per entry
pub fn write_csv<W: Write>(entries: &[LogEntry], writer: W) -> Result<(), AuditError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for entry in entries {
        csv.write_record([
            entry.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            entry.action.to_string(),
            entry.client_key.clone(),
            entry.detail.to_string(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Export `entries` to an in-memory CSV document
pub fn to_csv(entries: &[LogEntry]) -> Result<Vec<u8>, AuditError> {
    let mut out = Vec::new();
    write_csv(entries, &mut out)?;
    Ok(out)
}
