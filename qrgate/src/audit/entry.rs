//! Log entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Generate,
    Decode,
    Ocr,
    GenerateError,
    DecodeError,
    OcrError,
    /// A request to a non-operation route (stats, export, health)
    Access,
}

impl Action {
    /// Every action, in reporting order
    pub const ALL: [Action; 7] = [
        Action::Generate,
        Action::Decode,
        Action::Ocr,
        Action::GenerateError,
        Action::DecodeError,
        Action::OcrError,
        Action::Access,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Decode => "decode",
            Action::Ocr => "ocr",
            Action::GenerateError => "generate_error",
            Action::DecodeError => "decode_error",
            Action::OcrError => "ocr_error",
            Action::Access => "access",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Action::GenerateError | Action::DecodeError | Action::OcrError
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown action name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action: {}", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Per-action detail of an entry
///
/// Rendered as a single text field in exports, e.g. `rate_limited` or
/// `text_len=12 payload_len=9 compressed=true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    /// A QR code was rendered
    Generated {
        text_len: usize,
        payload_len: usize,
        compressed: bool,
    },
    /// A QR code was scanned
    Decoded { payload_len: usize, compressed: bool },
    /// Text was extracted from an image
    Extracted {
        languages: Vec<String>,
        text_len: usize,
    },
    /// The call was refused by the rate limiter
    RateLimited,
    /// The call failed; the message comes from validation or the library
    Failed { message: String },
    /// A non-operation route was requested
    Accessed { path: String },
}

impl Detail {
    pub fn failed(message: impl Into<String>) -> Self {
        Detail::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detail::Generated {
                text_len,
                payload_len,
                compressed,
            } => write!(
                f,
                "text_len={text_len} payload_len={payload_len} compressed={compressed}"
            ),
            Detail::Decoded {
                payload_len,
                compressed,
            } => write!(f, "payload_len={payload_len} compressed={compressed}"),
            Detail::Extracted {
                languages,
                text_len,
            } => write!(f, "languages={} text_len={text_len}", languages.join("+")),
            Detail::RateLimited => f.write_str("rate_limited"),
            Detail::Failed { message } => f.write_str(message),
            Detail::Accessed { path } => write!(f, "path={path}"),
        }
    }
}

/// One immutable record of an operation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub client_key: String,
    pub detail: Detail,
}

/// An entry waiting for its timestamp
///
/// Writers hand these to the log, which stamps them at append time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub action: Action,
    pub client_key: String,
    pub detail: Detail,
}

impl PendingEntry {
    pub fn new(action: Action, client_key: impl Into<String>, detail: Detail) -> Self {
        PendingEntry {
            action,
            client_key: client_key.into(),
            detail,
        }
    }

    pub fn stamp(self, timestamp: DateTime<Utc>) -> LogEntry {
        LogEntry {
            timestamp,
            action: self.action,
            client_key: self.client_key,
            detail: self.detail,
        }
    }
}

/// Selects entries from the log
///
/// All set criteria must match. `limit` keeps the newest `limit` matches,
/// still returned oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub action: Option<Action>,
    pub client_key: Option<String>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.action.is_none_or(|action| entry.action == action)
            && self
                .client_key
                .as_deref()
                .is_none_or(|client| entry.client_key == client)
            && self.since.is_none_or(|since| entry.timestamp >= since)
            && self.until.is_none_or(|until| entry.timestamp < until)
    }

    /// Apply the filter to entries already in log order
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a LogEntry>) -> Vec<LogEntry> {
        let mut selected: Vec<LogEntry> = entries
            .into_iter()
            .filter(|entry| self.matches(entry))
            .cloned()
            .collect();
        if let Some(limit) = self.limit {
            let skip = selected.len().saturating_sub(limit);
            selected.drain(..skip);
        }
        selected
    }
}
