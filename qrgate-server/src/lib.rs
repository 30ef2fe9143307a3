//! # qrgate server
//!
//! An HTTP service that renders QR codes, reads them back and extracts text
//! from images, with a per-client rate limit on every operation and a
//! durable log of every attempt.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! qrgate --help
//!
//! # Listen on all interfaces, keep the log under /var/lib
//! qrgate --host 0.0.0.0 --audit-path /var/lib/qrgate/audit.jsonl
//!
//! # List all available environment variables
//! qrgate --list-env-vars
//! ```
//!
//! ## Using the API
//!
//! ```bash
//! # Render a QR code, compressing long text first
//! curl -F text="hello world" -F compress=true http://localhost:8000/generate -o code.png
//!
//! # Read it back
//! curl -F image=@code.png http://localhost:8000/decode
//!
//! # Usage per action, bucketed by hour
//! curl "http://localhost:8000/stats?bucket=hour"
//! ```
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────┐
//!                │  HTTP Transport  │
//!                └────────┬─────────┘
//!                         │
//!                ┌────────▼─────────┐    spawn_blocking   ┌────────────┐
//!                │   Orchestrator   ├────────────────────►│  Engines   │
//!                └───┬──────────┬───┘                     │ QR  / OCR  │
//!                    │          │                         └────────────┘
//!          ┌─────────▼──┐    ┌──▼─────────┐
//!          │  Limiter   │    │  Journal   │
//!          │   Actor    │    │   Actor    │
//!          └─────┬──────┘    └──┬─────────┘
//!                │              │
//!          ┌─────▼──────┐    ┌──▼─────────┐
//!          │RateLimiter │    │  AuditLog  │
//!          │   Store    │    │ JSON Lines │
//!          └────────────┘    └────────────┘
//! ```
//!
//! The limiter actor owns all rate windows, so concurrent requests can never
//! jointly exceed a limit. The journal actor owns the log file and appends
//! one entry at a time. Image work runs on the blocking pool so a slow OCR
//! call never holds up admission or logging.

pub mod actor;
pub mod config;
pub mod engines;
pub mod error;
pub mod journal;
pub mod metrics;
pub mod orchestrator;
pub mod store;
pub mod transport;
pub mod types;
