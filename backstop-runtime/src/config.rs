//! Limiter configuration and CLI argument parsing
//!
//! Configuration comes from three layers:
//! - Command-line arguments (highest priority)
//! - Environment variables with the `BACKSTOP` prefix
//! - An optional settings file (TOML, YAML or JSON) listing the limiters
//!
//! # Settings File
//!
//! ```toml
//! [[limiters]]
//! name = "github"
//! bucket_size = 5000
//! refill_rate = 83
//! refill_interval_ms = 60000
//!
//! [[limiters]]
//! name = "slack"   # everything else defaults
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! # Classify a response
//! backstop classify --status 429 --header retry-after:10
//!
//! # Drive a configured limiter with 120 concurrent callers
//! export BACKSTOP_CONFIG=limiters.toml
//! backstop simulate --limiter github --callers 120 --timeout-ms 500
//! ```

use crate::error::ConfigError;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BUCKET_SIZE: u64 = 100;
pub const DEFAULT_REFILL_RATE: u64 = 10;
pub const DEFAULT_REFILL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Configuration for one token bucket
///
/// Only `name` is required. A bucket starts full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Logical bucket name, one per rate-limited API or account
    pub name: String,
    /// Maximum tokens the bucket holds
    #[serde(default = "default_bucket_size")]
    pub bucket_size: u64,
    /// Tokens added per refill tick
    #[serde(default = "default_refill_rate")]
    pub refill_rate: u64,
    /// Milliseconds between refill ticks
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
    /// How long `acquire` waits when the caller gives no timeout
    #[serde(default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: u64,
}

fn default_bucket_size() -> u64 {
    DEFAULT_BUCKET_SIZE
}

fn default_refill_rate() -> u64 {
    DEFAULT_REFILL_RATE
}

fn default_refill_interval_ms() -> u64 {
    DEFAULT_REFILL_INTERVAL_MS
}

fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

impl LimiterConfig {
    /// A config with every optional field at its default
    pub fn new(name: impl Into<String>) -> Self {
        LimiterConfig {
            name: name.into(),
            bucket_size: DEFAULT_BUCKET_SIZE,
            refill_rate: DEFAULT_REFILL_RATE,
            refill_interval_ms: DEFAULT_REFILL_INTERVAL_MS,
            default_wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
        }
    }

    pub fn bucket_size(mut self, bucket_size: u64) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    pub fn refill_rate(mut self, refill_rate: u64) -> Self {
        self.refill_rate = refill_rate;
        self
    }

    pub fn refill_interval_ms(mut self, refill_interval_ms: u64) -> Self {
        self.refill_interval_ms = refill_interval_ms;
        self
    }

    pub fn default_wait_timeout_ms(mut self, default_wait_timeout_ms: u64) -> Self {
        self.default_wait_timeout_ms = default_wait_timeout_ms;
        self
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.default_wait_timeout_ms)
    }

    /// Reject configurations the limiter cannot run with
    ///
    /// A zero `default_wait_timeout_ms` is allowed: it makes `acquire` fail immediately
    /// whenever the bucket is empty.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyName`] if the name is blank
    /// - [`ConfigError::NonPositive`] if bucket size, refill rate or refill interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let sizes = [
            ("bucket_size", self.bucket_size),
            ("refill_rate", self.refill_rate),
            ("refill_interval_ms", self.refill_interval_ms),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(ConfigError::NonPositive {
                    name: self.name.clone(),
                    field,
                });
            }
        }

        Ok(())
    }
}

/// Everything loaded from the settings file and environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
}

impl Settings {
    /// Load settings from an optional file, overlaid with `BACKSTOP__*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any limiter is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("BACKSTOP")
                .prefix_separator("__")
                .separator("__"),
        );

        Self::finish(builder)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let builder = ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml));

        Self::finish(builder)
    }

    fn finish(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every limiter and reject duplicate names
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for limiter in &self.limiters {
            limiter.validate()?;
            if !seen.insert(limiter.name.as_str()) {
                return Err(ConfigError::DuplicateName(limiter.name.clone()));
            }
        }
        Ok(())
    }
}

/// Command-line arguments for the `backstop` binary
///
/// `--config` and `--log-level` can also be set through `BACKSTOP_CONFIG` and
/// `BACKSTOP_LOG_LEVEL`; CLI arguments take precedence.
#[derive(Parser, Debug)]
#[command(
    name = "backstop",
    about = "Inspect rate-limit classification and drive token-bucket limiters",
    long_about = "Diagnostics for the backstop resilience core.\n\nEnvironment variables with the BACKSTOP_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "FILE",
        help = "Settings file listing the limiters",
        env = "BACKSTOP_CONFIG"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "BACKSTOP_LOG_LEVEL"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the recovery decision for a status code and headers
    Classify {
        #[arg(long, help = "HTTP status code")]
        status: u16,
        #[arg(
            long = "header",
            value_name = "NAME:VALUE",
            help = "Response header, repeatable",
            value_parser = parse_header
        )]
        headers: Vec<(String, String)>,
    },
    /// Fire concurrent acquires at a limiter and print its final state
    Simulate {
        #[arg(long, value_name = "NAME", help = "Limiter name from the settings file")]
        limiter: String,
        #[arg(long, value_name = "N", default_value_t = 10, help = "Concurrent callers")]
        callers: usize,
        #[arg(long, value_name = "MS", help = "Per-call acquire timeout")]
        timeout_ms: Option<u64>,
        #[arg(
            long,
            value_name = "N",
            help = "Apply an x-ratelimit-remaining header before the callers start"
        )]
        remaining: Option<u64>,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
