//! Terminal user interface for kshelf.
//!
//! A single screen lists the releases, newest first, with their state and
//! the chosen one highlighted. Every key maps onto a [`VersionManager`]
//! intent; the screen only renders what the manager publishes.
//!
//! ## Headless Detection
//!
//! The TUI will not launch in headless environments:
//! - When `KSHELF_NO_TUI` environment variable is set (any value)
//! - When stdout is not a terminal (piped or redirected)
//!
//! ## Modules
//!
//! - [`terminal`] - Terminal setup and cleanup with RAII guard
//! - [`app`] - Screen state, key handling and the event loop
//! - [`view`] - Rendering
//! - [`theme`] - Color theme

pub mod app;
pub mod terminal;
pub mod theme;
pub mod view;

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result};
use kshelf_core::{ShelfConfig, Status, VersionManager};
use tokio::runtime::Handle;
use tracing::warn;

use terminal::TerminalGuard;

/// Environment variable that disables the TUI.
pub const NO_TUI_ENV: &str = "KSHELF_NO_TUI";

/// How long to wait for cancellations and deletes after the screen closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Returns `false` when `KSHELF_NO_TUI` is set or stdout is not a TTY.
#[must_use]
pub fn should_use_tui() -> bool {
    if std::env::var_os(NO_TUI_ENV).is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

/// Runs the release screen until the user quits.
///
/// The event loop runs on a blocking thread while the manager's tasks run
/// on the runtime. Downloads still in flight when the user quits are
/// cancelled.
///
/// # Errors
///
/// Returns an error if the manager cannot be built or the terminal fails.
pub async fn run(config: &ShelfConfig) -> Result<()> {
    let manager = VersionManager::from_config(config).context("failed to set up HTTP clients")?;
    let runtime = Handle::current();

    let screen_manager = manager.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = TerminalGuard::new().context("failed to initialize terminal")?;
        app::run_app(&mut guard, screen_manager, runtime).context("TUI application error")
    })
    .await
    .context("TUI thread panicked")??;

    for row in manager.releases() {
        if matches!(row.status, Status::Downloading { .. }) {
            manager.cancel(&row.release);
        }
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, manager.wait_idle())
        .await
        .is_err()
    {
        warn!("background tasks still running at exit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn should_use_tui_respects_no_tui_env() {
        let original = std::env::var(NO_TUI_ENV).ok();

        // SAFETY: serialised with every other test touching the environment.
        unsafe {
            std::env::set_var(NO_TUI_ENV, "1");
        }
        assert!(!should_use_tui());

        // Empty string still disables TUI (env var is set)
        unsafe {
            std::env::set_var(NO_TUI_ENV, "");
        }
        assert!(!should_use_tui());

        unsafe {
            match original {
                Some(val) => std::env::set_var(NO_TUI_ENV, val),
                None => std::env::remove_var(NO_TUI_ENV),
            }
        }
    }
}
