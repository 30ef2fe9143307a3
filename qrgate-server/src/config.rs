//! Server configuration and CLI argument parsing
//!
//! Every setting can come from a command-line flag or a `QRGATE_`
//! environment variable.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! qrgate --port 9000 --rate-limit 10
//!
//! # Using environment variables
//! export QRGATE_AUDIT_PATH=/var/lib/qrgate/audit.jsonl
//! export QRGATE_OCR_LANGUAGES=en,ja
//! qrgate
//!
//! # Mixed (CLI overrides env)
//! export QRGATE_PORT=8080
//! qrgate --port 9090  # Uses port 9090
//! ```

use crate::engines::ocr::{OcrLanguage, parse_languages};
use anyhow::{Result, anyhow};
use clap::Parser;
use qrgate::WindowPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the server
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP transport configuration
    pub http: HttpConfig,
    /// Per-client admission limits
    pub limit: LimitConfig,
    /// Rate limiter store configuration
    pub store: StoreConfig,
    /// Operation log configuration
    pub audit: AuditConfig,
    /// Image collaborator configuration
    pub engines: EngineConfig,
    /// Channel buffer size for actor communication
    pub buffer_size: usize,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// Take the client key from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
    /// Record requests to non-operation routes in the log
    pub audit_access: bool,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

/// Fixed-window admission limits, shared by all endpoint classes
#[derive(Debug, Clone, Copy)]
pub struct LimitConfig {
    /// Calls allowed per window
    pub requests: u64,
    /// Window length (seconds)
    pub window_secs: u64,
}

impl LimitConfig {
    pub fn policy(&self) -> WindowPolicy {
        WindowPolicy::new(self.requests, Duration::from_secs(self.window_secs))
    }
}

/// Rate limiter store configuration
///
/// - **Periodic**: Cleanups at fixed intervals, predictable memory usage
/// - **Probabilistic**: Cleanup every N writes, lower overhead on quiet servers
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Type of store to use
    pub store_type: StoreType,
    /// Initial capacity of the store
    pub capacity: usize,
    /// Cleanup interval for the periodic store and the actor sweep (seconds)
    pub cleanup_interval: u64,
    /// Cleanup probability for probabilistic store (1 in N)
    pub cleanup_probability: u64,
}

/// Available store types for the rate limiter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreType {
    /// Fixed interval cleanup
    Periodic,
    /// Cleanup on a 1-in-N write schedule
    Probabilistic,
}

impl std::str::FromStr for StoreType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "periodic" => Ok(StoreType::Periodic),
            "probabilistic" => Ok(StoreType::Probabilistic),
            _ => Err(anyhow!(
                "Invalid store type: {}. Valid options are: periodic, probabilistic",
                s
            )),
        }
    }
}

/// Operation log configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// JSON Lines file holding the log
    pub path: PathBuf,
}

/// Image collaborator configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Languages used by OCR when a request names none
    pub ocr_languages: Vec<OcrLanguage>,
    /// Upper bound on a single collaborator call (seconds)
    pub timeout_secs: u64,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// QRGATE_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "qrgate",
    about = "QR code generation, decoding and OCR service",
    long_about = "A QR code and OCR web service with per-client rate limiting and a durable operation log.\n\nEnvironment variables with QRGATE_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP Transport
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "QRGATE_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8000,
        env = "QRGATE_PORT"
    )]
    pub port: u16,
    #[arg(
        long,
        help = "Use X-Forwarded-For as the client key",
        env = "QRGATE_TRUST_FORWARDED_FOR"
    )]
    pub trust_forwarded_for: bool,
    #[arg(
        long,
        value_name = "BOOL",
        help = "Log requests to stats, logs, health and metrics routes",
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "QRGATE_AUDIT_ACCESS"
    )]
    pub audit_access: bool,
    #[arg(
        long,
        value_name = "BYTES",
        help = "Maximum request body size",
        default_value_t = 10 * 1024 * 1024,
        env = "QRGATE_MAX_UPLOAD_BYTES"
    )]
    pub max_upload_bytes: usize,

    // Rate limiting
    #[arg(
        long,
        value_name = "N",
        help = "Calls allowed per client and endpoint in each window",
        default_value_t = 5,
        env = "QRGATE_RATE_LIMIT"
    )]
    pub rate_limit: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Rate limit window length (seconds)",
        default_value_t = 60,
        env = "QRGATE_RATE_WINDOW"
    )]
    pub rate_window: u64,

    // Store Configuration
    #[arg(
        long,
        value_name = "TYPE",
        help = "Store type: periodic, probabilistic",
        default_value = "periodic",
        env = "QRGATE_STORE"
    )]
    pub store: StoreType,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial store capacity",
        default_value_t = 10_000,
        env = "QRGATE_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between sweeps of expired windows (seconds)",
        default_value_t = 60,
        env = "QRGATE_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Cleanup probability for probabilistic store (1 in N)",
        default_value_t = 1_000,
        env = "QRGATE_STORE_CLEANUP_PROBABILITY"
    )]
    pub store_cleanup_probability: u64,

    // Operation log
    #[arg(
        long,
        value_name = "PATH",
        help = "Operation log file (JSON Lines)",
        default_value = "data/audit.jsonl",
        env = "QRGATE_AUDIT_PATH"
    )]
    pub audit_path: PathBuf,

    // Collaborators
    #[arg(
        long,
        value_name = "LANGS",
        help = "Default OCR languages: en, ch_sim, ch_tra, ja, ko",
        default_value = "en,ch_sim",
        env = "QRGATE_OCR_LANGUAGES"
    )]
    pub ocr_languages: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "Timeout for a single QR or OCR call (seconds)",
        default_value_t = 30,
        env = "QRGATE_ENGINE_TIMEOUT"
    )]
    pub engine_timeout: u64,

    // General options
    #[arg(
        long,
        value_name = "SIZE",
        help = "Channel buffer size",
        default_value_t = 1_024,
        env = "QRGATE_BUFFER_SIZE"
    )]
    pub buffer_size: usize,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "QRGATE_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range or the OCR language list
    /// names an unsupported language.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let ocr_languages = parse_languages(&args.ocr_languages)
            .map_err(|e| anyhow!("Invalid --ocr-languages: {}", e))?;

        let config = Config {
            http: HttpConfig {
                host: args.host,
                port: args.port,
                trust_forwarded_for: args.trust_forwarded_for,
                audit_access: args.audit_access,
                max_upload_bytes: args.max_upload_bytes,
            },
            limit: LimitConfig {
                requests: args.rate_limit,
                window_secs: args.rate_window,
            },
            store: StoreConfig {
                store_type: args.store,
                capacity: args.store_capacity,
                cleanup_interval: args.store_cleanup_interval,
                cleanup_probability: args.store_cleanup_probability,
            },
            audit: AuditConfig {
                path: args.audit_path,
            },
            engines: EngineConfig {
                ocr_languages,
                timeout_secs: args.engine_timeout,
            },
            buffer_size: args.buffer_size,
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        const MAX_WINDOW_SECS: u64 = 7 * 86_400;
        const MAX_CLEANUP_INTERVAL_SECS: u64 = 86_400;

        if self.limit.requests == 0 {
            return Err(anyhow!("--rate-limit must be at least 1"));
        }
        if self.limit.window_secs == 0 {
            return Err(anyhow!("--rate-window must be at least 1 second"));
        }
        if self.limit.window_secs > MAX_WINDOW_SECS {
            return Err(anyhow!(
                "--rate-window must be at most {MAX_WINDOW_SECS} seconds (7 days)"
            ));
        }
        if self.store.cleanup_interval == 0 {
            return Err(anyhow!("--store-cleanup-interval must be at least 1 second"));
        }
        if self.store.cleanup_interval > MAX_CLEANUP_INTERVAL_SECS {
            return Err(anyhow!(
                "--store-cleanup-interval must be at most {MAX_CLEANUP_INTERVAL_SECS} seconds (1 day)"
            ));
        }
        if self.store.cleanup_probability == 0 {
            return Err(anyhow!("--store-cleanup-probability must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(anyhow!("--buffer-size must be at least 1"));
        }
        if self.engines.timeout_secs == 0 {
            return Err(anyhow!("--engine-timeout must be at least 1 second"));
        }
        if self.engines.ocr_languages.is_empty() {
            return Err(anyhow!("--ocr-languages must name at least one language"));
        }
        if self.audit.path.as_os_str().is_empty() {
            return Err(anyhow!("--audit-path must not be empty"));
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("qrgate Environment Variables");
        println!("============================");
        println!();
        println!("All environment variables use the QRGATE_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("HTTP Configuration:");
        println!("  QRGATE_HOST=<host>                    HTTP host [default: 127.0.0.1]");
        println!("  QRGATE_PORT=<port>                    HTTP port [default: 8000]");
        println!("  QRGATE_TRUST_FORWARDED_FOR=true|false Use X-Forwarded-For as client key");
        println!("  QRGATE_AUDIT_ACCESS=true|false        Log non-operation routes [default: true]");
        println!("  QRGATE_MAX_UPLOAD_BYTES=<bytes>       Maximum body size [default: 10485760]");
        println!();

        println!("Rate Limiting:");
        println!("  QRGATE_RATE_LIMIT=<n>                 Calls per window [default: 5]");
        println!("  QRGATE_RATE_WINDOW=<secs>             Window length [default: 60]");
        println!(
            "  QRGATE_STORE=<type>                   Store type: periodic, probabilistic [default: periodic]"
        );
        println!("  QRGATE_STORE_CAPACITY=<size>          Initial store capacity [default: 10000]");
        println!(
            "  QRGATE_STORE_CLEANUP_INTERVAL=<secs>  Sweep interval in seconds [default: 60]"
        );
        println!(
            "  QRGATE_STORE_CLEANUP_PROBABILITY=<n>  Cleanup probability (1 in N) [default: 1000]"
        );
        println!();

        println!("Operation Log:");
        println!("  QRGATE_AUDIT_PATH=<path>              Log file [default: data/audit.jsonl]");
        println!();

        println!("Collaborators:");
        println!("  QRGATE_OCR_LANGUAGES=<langs>          Default OCR languages [default: en,ch_sim]");
        println!("  QRGATE_ENGINE_TIMEOUT=<secs>          Per-call timeout [default: 30]");
        println!();

        println!("General Configuration:");
        println!("  QRGATE_BUFFER_SIZE=<size>             Channel buffer size [default: 1024]");
        println!(
            "  QRGATE_LOG_LEVEL=<level>              Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Allow 10 calls per minute and keep the log elsewhere");
        println!("  export QRGATE_RATE_LIMIT=10");
        println!("  export QRGATE_AUDIT_PATH=/var/lib/qrgate/audit.jsonl");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  qrgate --port 9090");
    }
}
