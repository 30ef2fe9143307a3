//! Common types used across the server
//!
//! This module defines the admission request and response types shared by
//! the orchestrator and the limiter actor, plus the client identity used to
//! key rate limits.

use qrgate::WindowResult;
use qrgate::audit::Action;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

/// Operation family; each class has its own rate limit per client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Generate,
    Decode,
    Ocr,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 3] = [
        EndpointClass::Generate,
        EndpointClass::Decode,
        EndpointClass::Ocr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Generate => "generate",
            EndpointClass::Decode => "decode",
            EndpointClass::Ocr => "ocr",
        }
    }

    /// Action logged when the operation succeeds
    pub fn success_action(&self) -> Action {
        match self {
            EndpointClass::Generate => Action::Generate,
            EndpointClass::Decode => Action::Decode,
            EndpointClass::Ocr => Action::Ocr,
        }
    }

    /// Action logged when the operation fails or is rejected
    pub fn error_action(&self) -> Action {
        match self {
            EndpointClass::Generate => Action::GenerateError,
            EndpointClass::Decode => Action::DecodeError,
            EndpointClass::Ocr => Action::OcrError,
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the caller, used for rate limiting and auditing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(key: impl Into<String>) -> Self {
        ClientKey(key.into())
    }

    /// Resolve the caller from the connection
    ///
    /// With `trust_forwarded_for`, the first hop of an `X-Forwarded-For`
    /// header wins over the peer address. Without any usable source the key
    /// is `"unknown"`.
    pub fn resolve(
        peer: Option<SocketAddr>,
        forwarded_for: Option<&str>,
        trust_forwarded_for: bool,
    ) -> Self {
        if trust_forwarded_for {
            let first_hop = forwarded_for
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|hop| !hop.is_empty());
            if let Some(hop) = first_hop {
                return ClientKey::new(hop);
            }
        }

        match peer {
            Some(addr) => ClientKey::new(addr.ip().to_string()),
            None => ClientKey::new(Self::UNKNOWN),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Admission request handed to the limiter actor
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub class: EndpointClass,
    pub client_key: ClientKey,
    /// Time of the request, used for window arithmetic
    pub timestamp: SystemTime,
}

impl AdmissionRequest {
    pub fn new(class: EndpointClass, client_key: ClientKey) -> Self {
        AdmissionRequest {
            class,
            client_key,
            timestamp: SystemTime::now(),
        }
    }

    /// Limiter key: `"<class>:<client>"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.class, self.client_key)
    }
}

/// Admission decision
///
/// Durations are whole seconds, rounded up so a client that waits
/// `retry_after` seconds is never rejected again by the same window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: u64,
    pub retry_after: u64,
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl From<(bool, WindowResult)> for AdmissionResponse {
    fn from((allowed, result): (bool, WindowResult)) -> Self {
        AdmissionResponse {
            allowed,
            limit: result.limit,
            remaining: result.remaining,
            reset_after: ceil_secs(result.reset_after),
            retry_after: ceil_secs(result.retry_after),
        }
    }
}
