//! Command modules for the kshelf CLI.
//!
//! Every command builds a [`VersionManager`] from the resolved
//! configuration, loads the persisted state and drives the manager the same
//! way the TUI does.
//!
//! ## Commands
//!
//! - [`versions`] - List known releases
//! - [`refresh`] - Fetch the release list from the registry
//! - [`download`] - Download a release
//! - [`remove`] - Remove a downloaded release
//! - [`choose`] - Set or clear the chosen release
//! - [`current`] - Show the chosen release

pub mod choose;
pub mod current;
pub mod download;
pub mod refresh;
pub mod remove;
pub mod versions;

use anyhow::{Context, Result};
use clap::Args;
use kshelf_core::{ReleaseId, ShelfConfig, Status, VersionManager};

use crate::errors::KshelfError;

/// Selects one release by version and, optionally, publish timestamp.
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Version to act on (e.g., "2.0.20").
    pub version: String,

    /// Publish timestamp in milliseconds, to pick one of several releases
    /// sharing a version. The newest is used when omitted.
    #[clap(long, short = 't', value_name = "MS")]
    pub timestamp: Option<i64>,
}

/// A manager with persisted state loaded.
pub struct Session {
    pub config: ShelfConfig,
    pub manager: VersionManager,
}

impl Session {
    /// Resolves configuration and loads the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, or if there is no
    /// snapshot and the registry cannot be reached.
    pub async fn open() -> Result<Self> {
        let config = ShelfConfig::load().context("failed to load configuration")?;
        let manager =
            VersionManager::from_config(&config).context("failed to set up HTTP clients")?;
        manager
            .load()
            .await
            .context("failed to load the release list")?;
        Ok(Self { config, manager })
    }

    /// Looks the release named by `args` up.
    ///
    /// # Errors
    ///
    /// Returns [`KshelfError::UnknownRelease`] if no release matches.
    pub fn resolve(&self, args: &ReleaseArgs) -> Result<ReleaseId> {
        self.manager
            .find(&args.version, args.timestamp)
            .ok_or_else(|| {
                KshelfError::UnknownRelease {
                    version: describe(args),
                }
                .into()
            })
    }

    /// Current status of a release resolved by [`Session::resolve`].
    pub fn status(&self, release: &ReleaseId) -> Status {
        self.manager
            .status(release)
            .unwrap_or(Status::NotDownloaded)
    }

    /// Lets spawned tasks finish before the process exits.
    pub async fn close(self) {
        self.manager.wait_idle().await;
    }
}

fn describe(args: &ReleaseArgs) -> String {
    match args.timestamp {
        Some(ts) => format!("{} ({ts})", args.version),
        None => args.version.clone(),
    }
}

/// Error for a release some other task is working on.
pub(crate) fn busy(release: &ReleaseId, status: Status) -> anyhow::Error {
    KshelfError::Busy {
        release: release.to_string(),
        status: status.label(),
    }
    .into()
}
