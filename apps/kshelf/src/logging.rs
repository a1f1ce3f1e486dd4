//! Logging setup using `tracing-subscriber`.
//!
//! The core logs through `tracing`; this module installs the subscriber.
//! In CLI mode records go to stderr, in TUI mode they are appended to
//! `<home>/kshelf.log` so they do not tear the alternate screen.
//!
//! ## Levels
//!
//! - no `-v`: warnings and errors
//! - `-v`: lifecycle messages (refresh, download start and end)
//! - `-vv`: every state transition
//! - `-vvv`: trace
//!
//! `KSHELF_LOG` takes an `EnvFilter` directive and overrides the flags.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "KSHELF_LOG";

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Append to this file instead of writing to stderr.
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    /// Maps the `-v` count to a level.
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            log_file: None,
        }
    }

    #[must_use]
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    /// The filter used when `KSHELF_LOG` is unset: our crates at the chosen
    /// level, everything else at warn.
    fn default_directive(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        format!("warn,kshelf={level},kshelf_core={level}")
    }
}

/// Installs the global subscriber. Call once at startup.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
                .context("failed to install log subscriber")?;
        }
        None => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
                .context("failed to install log subscriber")?;
        }
    }
    Ok(())
}
