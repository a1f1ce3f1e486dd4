//! Versions command for the kshelf CLI.
//!
//! Lists known releases, newest first, with their local state.
//!
//! ## Usage
//!
//! ```bash
//! kshelf versions               # List from the last known release list
//! kshelf versions --refresh     # Fetch the registry first
//! kshelf versions --downloaded  # Only releases on disk
//! kshelf versions --json        # Output in JSON format
//! ```
//!
//! ## Output Format
//!
//! ```text
//! Kotlin compiler releases:
//!
//! * 2.0.20     2024-08-22  downloaded
//!   2.0.10     2024-08-01  not downloaded
//!
//!   * = chosen
//! ```

use anyhow::Result;
use clap::Args;
use kshelf_core::{ReleaseView, Status};

use super::Session;

/// Arguments for the versions command.
#[derive(Args)]
pub struct VersionsArgs {
    /// Fetch the release list from the registry before listing.
    #[clap(long, short = 'r')]
    pub refresh: bool,

    /// Show only downloaded releases.
    #[clap(long, short = 'd')]
    pub downloaded: bool,

    /// Show releases in JSON format.
    #[clap(long, short = 'j')]
    pub json: bool,
}

/// Executes the versions command.
///
/// # Errors
///
/// Returns an error if the release list cannot be loaded or refreshed, or
/// JSON serialization fails.
pub async fn execute(args: &VersionsArgs) -> Result<()> {
    let session = Session::open().await?;
    if args.refresh {
        session.manager.refresh().await?;
    }

    let rows: Vec<ReleaseView> = session
        .manager
        .releases()
        .into_iter()
        .filter(|row| !args.downloaded || row.status == Status::Downloaded)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_text(&rows, args.downloaded));
    }

    session.close().await;
    Ok(())
}

fn render_text(rows: &[ReleaseView], downloaded_only: bool) -> String {
    use std::fmt::Write;

    if rows.is_empty() {
        return if downloaded_only {
            String::from("No releases downloaded.\n")
        } else {
            String::from("No releases known. Run 'kshelf refresh' to fetch the list.\n")
        };
    }

    let width = rows
        .iter()
        .map(|row| row.release.version.len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Kotlin compiler releases:\n\n");
    for row in rows {
        let marker = if row.chosen { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {:<width$}  {}  {}",
            row.release.version,
            row.release.published_on(),
            row.status.label(),
        );
    }
    if rows.iter().any(|row| row.chosen) {
        out.push_str("\n  * = chosen\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kshelf_core::ReleaseId;

    fn row(version: &str, timestamp: i64, status: Status, chosen: bool) -> ReleaseView {
        ReleaseView {
            release: ReleaseId::new(version, timestamp),
            status,
            chosen,
        }
    }

    #[test]
    fn text_marks_chosen_release() {
        let rows = [
            row("2.0.20", 1_724_320_800_000, Status::Downloaded, true),
            row("2.0.0", 1_716_336_000_000, Status::NotDownloaded, false),
        ];
        let text = render_text(&rows, false);
        assert!(text.contains("* 2.0.20  2024-08-22  downloaded"));
        assert!(text.contains("  2.0.0   2024-05-22  not downloaded"));
        assert!(text.ends_with("  * = chosen\n"));
    }

    #[test]
    fn text_shows_progress_label() {
        let rows = [row("1.9.0", 0, Status::Downloading { percent: Some(40) }, false)];
        assert!(render_text(&rows, false).contains("loading: 40%"));
    }

    #[test]
    fn empty_lists_have_hints() {
        assert!(render_text(&[], false).contains("kshelf refresh"));
        assert_eq!(render_text(&[], true), "No releases downloaded.\n");
    }

    #[test]
    fn json_rows_are_flat() {
        let rows = [row("2.0.20", 5, Status::Downloading { percent: None }, false)];
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "version": "2.0.20",
                "timestamp": 5,
                "state": "downloading",
                "percent": null,
                "chosen": false
            }])
        );
    }
}
