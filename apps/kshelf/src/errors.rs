//! Error types for the kshelf CLI.
//!
//! Commands return `anyhow::Result`; the variants here are the failures a
//! user can cause by naming the wrong release, plus the interrupt exit.

use thiserror::Error;

/// Exit code used after Ctrl-C, matching the shell convention.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// User-facing failures of the kshelf commands.
#[derive(Debug, Error)]
pub enum KshelfError {
    /// No known release carries the requested version.
    #[error("release {version} not found; run 'kshelf refresh' to update the list")]
    UnknownRelease {
        /// The version as typed by the user.
        version: String,
    },

    /// The command needs a downloaded release.
    #[error("release {release} is not downloaded; run 'kshelf download {version}' first")]
    NotDownloaded {
        /// Display form of the release.
        release: String,
        /// The version string, used in the hint.
        version: String,
    },

    /// Another task is working on the release.
    #[error("release {release} is busy ({status})")]
    Busy {
        /// Display form of the release.
        release: String,
        /// Current status label.
        status: String,
    },

    /// The user interrupted a running command. The command has already
    /// printed what happened.
    #[error("interrupted")]
    Interrupted,
}
