//! Raw-mode terminal setup, undone on drop.

use std::io::{self, Stdout};

use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Owns the terminal while the release screen is up.
///
/// Creation enables raw mode and enters the alternate screen. Dropping the
/// guard leaves both, also when the event loop returns early with an error.
pub struct TerminalGuard {
    pub terminal: TuiTerminal,
}

impl TerminalGuard {
    /// # Errors
    ///
    /// Returns an error if stdout is not a usable terminal.
    pub fn new() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;

        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e).context("failed to enter alternate screen");
        }

        let terminal = Terminal::new(CrosstermBackend::new(stdout))
            .context("failed to create terminal")?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}
