//! Refresh command for the kshelf CLI.
//!
//! Fetches the release list, reconciles local state against it and rewrites
//! the snapshot. Artifacts of releases the registry no longer lists are
//! deleted.
//!
//! ## Usage
//!
//! ```bash
//! kshelf refresh
//! ```

use anyhow::{Context, Result};
use kshelf_core::Status;

use super::Session;

/// Executes the refresh command.
///
/// # Errors
///
/// Returns an error if the registry cannot be reached.
pub async fn execute() -> Result<()> {
    let session = Session::open().await?;
    let count = session
        .manager
        .refresh()
        .await
        .context("failed to fetch the release list")?;

    let downloaded = session
        .manager
        .releases()
        .iter()
        .filter(|row| row.status == Status::Downloaded)
        .count();
    println!("Fetched {count} releases ({downloaded} downloaded).");

    session.close().await;
    Ok(())
}
