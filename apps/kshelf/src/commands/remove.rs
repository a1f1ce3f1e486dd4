//! Remove command for the kshelf CLI.
//!
//! Deletes the artifact of a downloaded release. If the release was the
//! chosen one, the choice is cleared.
//!
//! ## Usage
//!
//! ```bash
//! kshelf remove 2.0.20
//! ```

use anyhow::Result;
use kshelf_core::Status;

use super::{ReleaseArgs, Session, busy};
use crate::errors::KshelfError;

/// Executes the remove command.
///
/// # Errors
///
/// Returns an error if the release is unknown, not downloaded, or busy.
pub async fn execute(args: &ReleaseArgs) -> Result<()> {
    let session = Session::open().await?;
    let release = session.resolve(args)?;
    let was_chosen = session.manager.chosen().as_ref() == Some(&release);

    match session.status(&release) {
        Status::Downloaded => {}
        Status::NotDownloaded => {
            return Err(KshelfError::NotDownloaded {
                release: release.to_string(),
                version: release.version.clone(),
            }
            .into());
        }
        status @ (Status::Downloading { .. } | Status::Cancelling | Status::Removing) => {
            return Err(busy(&release, status));
        }
    }

    if !session.manager.remove(&release).await.is_applied() {
        return Err(busy(&release, session.status(&release)));
    }
    session.close().await;

    println!("Release {} removed.", release.version);
    if was_chosen {
        println!("It was the chosen release; no release is chosen now.");
    }
    Ok(())
}
