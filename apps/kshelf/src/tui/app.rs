//! Release screen state, key handling and the event loop.
//!
//! The loop runs on a blocking thread. It polls the terminal with a short
//! timeout and, between polls, drains manager events without waiting. Any
//! state event triggers a re-read of [`VersionManager::releases`], so the
//! screen never keeps its own copy of per-release state.
//!
//! ## Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | `j`/`k`, arrows | Move the cursor |
//! | `d` | Download the selected release |
//! | `c` | Cancel its download |
//! | `x` | Remove it |
//! | `Enter` | Choose it, or clear the choice if it is chosen |
//! | `r` | Refresh the release list |
//! | `q`, `Esc`, `Ctrl-C` | Quit |

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use kshelf_core::{Notice, NoticeKind, ReleaseId, ReleaseView, ShelfEvent, Status, VersionManager};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::terminal::TerminalGuard;
use super::theme::Theme;
use super::view;

/// Event polling timeout in milliseconds.
const POLL_TIMEOUT_MS: u64 = 100;

/// Results of intents that run on the async runtime.
#[derive(Debug)]
enum Outcome {
    Loaded,
    Refreshed(usize),
}

/// Screen state.
pub struct App {
    manager: VersionManager,
    runtime: Handle,
    events: broadcast::Receiver<ShelfEvent>,
    outcomes: (Sender<Outcome>, Receiver<Outcome>),
    pub(super) rows: Vec<ReleaseView>,
    pub(super) selected: usize,
    pub(super) loading: bool,
    pub(super) message: Option<Notice>,
    pub(super) theme: Theme,
    should_quit: bool,
}

impl App {
    #[must_use]
    pub fn new(manager: VersionManager, runtime: Handle) -> Self {
        let events = manager.subscribe();
        Self {
            manager,
            runtime,
            events,
            outcomes: mpsc::channel(),
            rows: Vec::new(),
            selected: 0,
            loading: false,
            message: None,
            theme: Theme::detect(),
            should_quit: false,
        }
    }

    /// Loads persisted state in the background.
    fn start_loading(&mut self) {
        self.loading = true;
        let manager = self.manager.clone();
        let done = self.outcomes.0.clone();
        self.runtime.spawn(async move {
            // Failures arrive as notices.
            let _ = manager.load().await;
            let _ = done.send(Outcome::Loaded);
        });
    }

    fn selected_release(&self) -> Option<&ReleaseView> {
        self.rows.get(self.selected)
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1),
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = self.rows.len().saturating_sub(1),
            KeyCode::Char('d') => self.download_selected(),
            KeyCode::Char('c') => self.cancel_selected(),
            KeyCode::Char('x') => self.remove_selected(),
            KeyCode::Enter => self.toggle_selected(),
            KeyCode::Char('r') => self.refresh(),
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.rows.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    fn download_selected(&mut self) {
        let Some(row) = self.selected_release() else {
            return;
        };
        match row.status {
            Status::NotDownloaded => {
                let release = row.release.clone();
                let _enter = self.runtime.enter();
                self.manager.download(&release);
            }
            Status::Downloaded => {
                let text = format!("{} is already downloaded", row.release.version);
                self.info(text);
            }
            Status::Downloading { .. } | Status::Cancelling | Status::Removing => {}
        }
    }

    fn cancel_selected(&mut self) {
        let Some(row) = self.selected_release() else {
            return;
        };
        if matches!(row.status, Status::Downloading { .. }) {
            let release = row.release.clone();
            let _enter = self.runtime.enter();
            self.manager.cancel(&release);
        }
    }

    fn remove_selected(&mut self) {
        let Some(row) = self.selected_release() else {
            return;
        };
        if row.status != Status::Downloaded {
            return;
        }
        let release = row.release.clone();
        let manager = self.manager.clone();
        self.runtime.spawn(async move { manager.remove(&release).await });
    }

    fn toggle_selected(&mut self) {
        let Some(row) = self.selected_release() else {
            return;
        };
        if row.status != Status::Downloaded {
            let text = format!("Download {} before choosing it", row.release.version);
            self.info(text);
            return;
        }
        let release = row.release.clone();
        let manager = self.manager.clone();
        self.runtime
            .spawn(async move { manager.toggle_chosen(&release).await });
    }

    fn refresh(&mut self) {
        if self.loading {
            return;
        }
        self.loading = true;
        self.info(String::from("Refreshing release list..."));
        let manager = self.manager.clone();
        let done = self.outcomes.0.clone();
        self.runtime.spawn(async move {
            let count = manager.refresh().await.unwrap_or(0);
            let _ = done.send(Outcome::Refreshed(count));
        });
    }

    fn info(&mut self, text: String) {
        self.message = Some(Notice::new(NoticeKind::Info, text));
    }

    /// Applies everything the manager and background intents reported since
    /// the last call. Never blocks.
    fn drain(&mut self) {
        let mut stale = false;
        loop {
            match self.events.try_recv() {
                Ok(ShelfEvent::Notice(notice)) => self.message = Some(notice),
                Ok(
                    ShelfEvent::StateChanged { .. }
                    | ShelfEvent::Reconciled { .. }
                    | ShelfEvent::ChosenChanged { .. },
                )
                | Err(TryRecvError::Lagged(_)) => stale = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        while let Ok(outcome) = self.outcomes.1.try_recv() {
            stale = true;
            match outcome {
                Outcome::Loaded => self.loading = false,
                Outcome::Refreshed(count) => {
                    self.loading = false;
                    let failed = self
                        .message
                        .as_ref()
                        .is_some_and(|notice| notice.kind == NoticeKind::Network);
                    if !failed {
                        self.info(format!("Fetched {count} releases"));
                    }
                }
            }
        }

        if stale {
            self.reload_rows();
        }
    }

    /// Re-reads the rows, keeping the cursor on the same release if it is
    /// still listed.
    fn reload_rows(&mut self) {
        let current: Option<ReleaseId> = self.selected_release().map(|row| row.release.clone());
        self.rows = self.manager.releases();
        self.selected = current
            .and_then(|release| self.rows.iter().position(|row| row.release == release))
            .unwrap_or(self.selected)
            .min(self.rows.len().saturating_sub(1));
    }
}

/// Runs the release screen until the user quits.
///
/// # Errors
///
/// Returns an error if drawing or reading terminal events fails.
pub fn run_app(guard: &mut TerminalGuard, manager: VersionManager, runtime: Handle) -> Result<()> {
    let mut app = App::new(manager, runtime);
    app.start_loading();

    while !app.should_quit {
        app.drain();
        guard
            .terminal
            .draw(|frame| view::render(&app, frame))
            .context("failed to draw frame")?;

        if event::poll(Duration::from_millis(POLL_TIMEOUT_MS)).context("event poll failed")?
            && let Event::Key(key) = event::read().context("failed to read event")?
            && key.kind == KeyEventKind::Press
        {
            app.handle_key(key.code, key.modifiers);
        }
    }
    Ok(())
}
