//! Current command for the kshelf CLI.
//!
//! Shows the chosen release and where its compiler artifact lives.
//!
//! ## Usage
//!
//! ```bash
//! kshelf current         # Human-readable
//! kshelf current --path  # Only the artifact path, for scripts
//! ```

use anyhow::{Result, bail};
use clap::Args;
use kshelf_core::FsStore;

use super::Session;

/// Arguments for the current command.
#[derive(Args)]
pub struct CurrentArgs {
    /// Print only the artifact path. Fails if no release is chosen.
    #[clap(long, short = 'p')]
    pub path: bool,
}

/// Executes the current command.
///
/// # Errors
///
/// Returns an error if the state cannot be loaded, or `--path` is given and
/// no release is chosen.
pub async fn execute(args: &CurrentArgs) -> Result<()> {
    let session = Session::open().await?;
    let chosen = session.manager.chosen();
    let artifact = chosen
        .as_ref()
        .and_then(|release| session.manager.downloaded_blob(release))
        .map(|blob| FsStore::new(&session.config).artifact_path(&blob));

    match (chosen, artifact) {
        (Some(release), Some(path)) => {
            if args.path {
                println!("{}", path.display());
            } else {
                println!(
                    "Chosen release: {} ({})",
                    release.version,
                    release.published_on()
                );
                println!("Artifact: {}", path.display());
            }
        }
        _ if args.path => bail!("no release is chosen"),
        _ => {
            println!("No release is chosen.");
            println!();
            println!("Run 'kshelf choose <version>' to choose a downloaded release.");
        }
    }

    session.close().await;
    Ok(())
}
