//! Logging setup
//!
//! The adapter logs through `tracing`. Hosts usually install their own
//! subscriber; when they don't, the `log-level` / `log-file` adapter options
//! install one here.
//!
//! ## Configuration priority
//!
//! 1. `log-level` / `log-file` adapter options (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Accepted values of the `log-level` option
pub const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// One of [`LOG_LEVELS`], any case
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

impl LogConfig {
    pub fn is_set(&self) -> bool {
        self.level.is_some() || self.file.is_some()
    }

    fn filter(&self) -> EnvFilter {
        match &self.level {
            Some(level) => EnvFilter::new(format!(
                "sqlbricks={0},sqlbricks_databricks={0}",
                level.to_lowercase()
            )),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sqlbricks_databricks=warn")),
        }
    }
}

/// Install a global subscriber, once per process
///
/// Later calls are no-ops, as is any call when the host already installed
/// a subscriber.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if matches!(&config.level, Some(level) if level.eq_ignore_ascii_case("off")) {
            return;
        }

        let registry = tracing_subscriber::registry().with(config.filter());

        match &config.file {
            Some(path) => {
                let file = match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                    Ok(file) => file,
                    Err(e) => {
                        eprintln!("sqlbricks: failed to open log file {}: {}", path, e);
                        return;
                    }
                };
                registry
                    .with(fmt::layer().with_writer(file).with_ansi(false))
                    .try_init()
                    .ok();
            }
            None => {
                registry
                    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                    .try_init()
                    .ok();
            }
        }
    });
}
