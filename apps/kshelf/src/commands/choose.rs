//! Choose command for the kshelf CLI.
//!
//! Sets the chosen release, which must be downloaded, or clears the choice.
//!
//! ## Usage
//!
//! ```bash
//! kshelf choose 2.0.20
//! kshelf choose --clear
//! ```

use anyhow::{Result, bail};
use clap::Args;
use kshelf_core::Status;

use super::{ReleaseArgs, Session, busy};
use crate::errors::KshelfError;

/// Arguments for the choose command.
#[derive(Args)]
pub struct ChooseArgs {
    /// Version to choose (e.g., "2.0.20").
    #[clap(required_unless_present = "clear", conflicts_with = "clear")]
    pub version: Option<String>,

    /// Publish timestamp in milliseconds, to pick one of several releases
    /// sharing a version.
    #[clap(long, short = 't', value_name = "MS", requires = "version")]
    pub timestamp: Option<i64>,

    /// Clear the chosen release.
    #[clap(long)]
    pub clear: bool,
}

/// Executes the choose command.
///
/// # Errors
///
/// Returns an error if the release is unknown or not downloaded.
pub async fn execute(args: &ChooseArgs) -> Result<()> {
    let session = Session::open().await?;

    let Some(version) = &args.version else {
        if session.manager.clear_chosen().await.is_applied() {
            println!("Chosen release cleared.");
        } else {
            println!("No release is chosen.");
        }
        session.close().await;
        return Ok(());
    };

    let release = session.resolve(&ReleaseArgs {
        version: version.clone(),
        timestamp: args.timestamp,
    })?;
    if session.manager.chosen().as_ref() == Some(&release) {
        println!("Release {} is already chosen.", release.version);
        return Ok(());
    }

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

    if !session.manager.toggle_chosen(&release).await.is_applied() {
        bail!("could not choose {release}");
    }
    session.close().await;
    println!("Release {} is now chosen.", release.version);
    Ok(())
}
