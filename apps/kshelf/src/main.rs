#![warn(clippy::pedantic)]

//! # kshelf
//!
//! Keeps a local shelf of Kotlin compiler releases: lists what Maven Central
//! publishes, downloads and removes compiler artifacts, and records which
//! release is the chosen one.
//!
//! ## Subcommands
//!
//! - `versions` - List known releases and their local state
//! - `refresh` - Fetch the release list from the registry
//! - `download` - Download a release
//! - `remove` - Remove a downloaded release
//! - `choose` - Set or clear the chosen release
//! - `current` - Show the chosen release
//!
//! ## Usage Modes
//!
//! ### Interactive Mode (default)
//!
//! Without a subcommand, `kshelf` opens a terminal UI listing all releases.
//!
//! ### Headless Mode (`--headless`)
//!
//! With `--headless` and no subcommand, `kshelf` prints a short hint instead
//! of opening the TUI.
//!
//! ## Examples
//!
//! ```bash
//! kshelf versions --refresh
//! kshelf download 2.0.20
//! kshelf choose 2.0.20
//! kshelf current --path
//! ```

mod commands;
mod errors;
mod logging;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ReleaseArgs, choose, current, download, refresh, remove, versions};
use errors::{INTERRUPTED_EXIT_CODE, KshelfError};
use kshelf_core::ShelfConfig;
use logging::LogConfig;

/// Kotlin compiler release manager.
#[derive(Parser)]
#[command(
    name = "kshelf",
    author,
    version,
    about = "Download, remove and choose Kotlin compiler releases",
    long_about = "kshelf keeps a local shelf of Kotlin compiler releases published on Maven \
    Central. Run it without a subcommand for an interactive list.",
    after_help = "\
ENVIRONMENT VARIABLES:
    KSHELF_HOME             Data directory (default: ~/.kshelf)
    KSHELF_REGISTRY         Release search URL (default: https://search.maven.org)
    KSHELF_REPOSITORY       Artifact repository URL (default: https://repo1.maven.org/maven2)
    KSHELF_NO_TUI           Disable interactive TUI
    KSHELF_LOG              Log filter directive (e.g. kshelf_core=debug)"
)]
pub struct Cli {
    /// Run in headless mode without TUI.
    #[clap(long = "headless", global = true, action = clap::ArgAction::SetTrue)]
    pub headless: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[clap(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands for the kshelf CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// List known releases.
    ///
    /// Shows every release from the last known release list, newest first,
    /// with its local state. The chosen release is marked with '*'.
    Versions(versions::VersionsArgs),

    /// Fetch the release list from the registry.
    ///
    /// Reconciles local state with the fetched list and deletes artifacts of
    /// releases that are no longer listed.
    Refresh,

    /// Download a release.
    ///
    /// Shows progress while downloading. Ctrl-C cancels the download.
    Download(ReleaseArgs),

    /// Remove a downloaded release.
    ///
    /// Clears the chosen release if it is the one removed.
    Remove(ReleaseArgs),

    /// Set or clear the chosen release.
    ///
    /// Only downloaded releases can be chosen.
    Choose(choose::ChooseArgs),

    /// Show the chosen release and its artifact path.
    Current(current::CurrentArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Handles an error and returns the appropriate exit code.
///
/// An interrupt has already been reported by the command, so it only maps to
/// the exit code. Everything else is printed and exits with 1.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(KshelfError::Interrupted) = e.downcast_ref::<KshelfError>() {
        return INTERRUPTED_EXIT_CODE;
    }
    eprintln!("Error: {e:?}");
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let log = LogConfig::from_verbosity(cli.verbose);

    let Some(command) = cli.command else {
        if cli.headless || !tui::should_use_tui() {
            logging::init_logging(&log)?;
            println!("kshelf: Kotlin compiler release manager");
            println!();
            println!("Run 'kshelf --help' for usage information.");
            println!("Run 'kshelf versions' to list releases.");
            return Ok(());
        }
        let config = ShelfConfig::load()?;
        logging::init_logging(&log.with_log_file(config.log_path()))?;
        return tui::run(&config).await;
    };

    logging::init_logging(&log)?;
    match command {
        Commands::Versions(args) => versions::execute(&args).await,
        Commands::Refresh => refresh::execute().await,
        Commands::Download(args) => download::execute(&args).await,
        Commands::Remove(args) => remove::execute(&args).await,
        Commands::Choose(args) => choose::execute(&args).await,
        Commands::Current(args) => current::execute(&args).await,
    }
}
