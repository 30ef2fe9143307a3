//! # qrgate
//!
//! Admission and bookkeeping core for a QR code / OCR service.
//!
//! ## Overview
//!
//! The expensive work of the service (rendering QR codes, scanning them,
//! running OCR) lives in external libraries. This crate holds the parts
//! around those calls that carry real invariants:
//!
//! - [`core`]: a fixed-window rate limiter keyed by client and endpoint class
//! - [`audit`]: an append-only operation log with stats and CSV export
//! - [`codec`]: the reversible compression applied to QR payload text
//!
//! ## Quick Start
//!
//! ```
//! use qrgate::{PeriodicStore, RateLimiter, WindowPolicy};
//! use std::time::SystemTime;
//!
//! let mut limiter = RateLimiter::new(PeriodicStore::new());
//! let policy = WindowPolicy::per_minute(5);
//!
//! let (allowed, result) = limiter
//!     .check("generate:203.0.113.7", policy, SystemTime::now())
//!     .unwrap();
//!
//! if allowed {
//!     println!("Admitted, {} left in this window", result.remaining);
//! } else {
//!     println!("Rate limited, retry in {}s", result.retry_after.as_secs());
//! }
//! ```
//!
//! ## Payload Codec
//!
//! ```
//! use qrgate::codec;
//!
//! let text = "二维码 payload, repeated repeated repeated repeated";
//! let payload = codec::compress(text).unwrap();
//! assert_eq!(codec::decompress(&payload).unwrap(), text);
//! ```
//!
//! ## Operation Log
//!
//! ```
//! use qrgate::audit::{Action, AuditLog, Detail, MemoryStore, PendingEntry};
//! use chrono::Utc;
//!
//! let mut log = AuditLog::new(MemoryStore::new()).unwrap();
//! log.record(
//!     PendingEntry::new(Action::GenerateError, "203.0.113.7", Detail::RateLimited),
//!     Utc::now(),
//! )
//! .unwrap();
//!
//! let stats = log.summarize().unwrap();
//! assert_eq!(stats.count(Action::GenerateError), 1);
//! assert_eq!(stats.count(Action::Generate), 0);
//! ```
//!
//! ## Thread Safety
//!
//! Neither [`RateLimiter`] nor [`audit::AuditLog`] is thread-safe on its
//! own. The server gives each one a single owning task and talks to it over
//! channels; a `Mutex` works just as well for embedded use.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing in the window stores

pub mod audit;
pub mod codec;
pub mod core;

pub use codec::{CodecError, DecodedPayload, PayloadEncoding};
pub use core::{
    LimitError, PeriodicStore, PeriodicStoreBuilder, ProbabilisticStore,
    ProbabilisticStoreBuilder, RateLimiter, Store, Window, WindowPolicy, WindowResult,
};

// Re-export the store module so benchmarks can access it
pub use crate::core::store;
