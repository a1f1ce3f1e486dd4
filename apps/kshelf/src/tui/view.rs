//! Rendering of the release screen.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use kshelf_core::{NoticeKind, ReleaseView, Status};

use super::app::App;
use super::theme::Theme;

const HELP: &str =
    "j/k move  d download  c cancel  x remove  Enter choose  r refresh  q quit";

/// Draws the whole screen.
pub fn render(app: &App, frame: &mut Frame) {
    let chunks = Layout::vertical([
        Constraint::Min(5),    // Release list
        Constraint::Length(3), // Status bar
        Constraint::Length(1), // Help
    ])
    .split(frame.area());

    render_releases(frame, chunks[0], app);
    render_status(frame, chunks[1], app);
    frame.render_widget(
        Paragraph::new(Span::styled(HELP, Style::default().fg(app.theme.muted))),
        chunks[2],
    );
}

/// Label shown in the action column.
#[must_use]
pub fn row_label(status: Status) -> String {
    match status {
        Status::NotDownloaded => String::from("Download"),
        Status::Downloading { percent: Some(p) } => format!("Loading: {p}%"),
        Status::Downloading { percent: None } => String::from("Loading..."),
        Status::Downloaded => String::from("Downloaded"),
        Status::Cancelling => String::from("Cancelling..."),
        Status::Removing => String::from("Removing..."),
    }
}

/// First row to draw so that `selected` stays within `height` visible rows.
fn scroll_offset(selected: usize, height: usize) -> usize {
    if height == 0 {
        return 0;
    }
    selected.saturating_sub(height - 1)
}

fn render_releases(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(
            " Kotlin compiler releases ",
            Style::default().fg(theme.title).add_modifier(Modifier::BOLD),
        ));

    let lines: Vec<Line> = if app.rows.is_empty() {
        let text = if app.loading {
            "  Loading releases..."
        } else {
            "  No releases known. Press r to refresh."
        };
        vec![Line::from(Span::styled(text, Style::default().fg(theme.muted)))]
    } else {
        let width = app
            .rows
            .iter()
            .map(|row| row.release.version.len())
            .max()
            .unwrap_or(0);
        app.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| release_line(row, idx == app.selected, width, theme))
            .collect()
    };

    let visible = usize::from(area.height.saturating_sub(2));
    let offset = u16::try_from(scroll_offset(app.selected, visible)).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(lines).block(block).scroll((offset, 0)), area);
}

fn release_line(row: &ReleaseView, selected: bool, width: usize, theme: &Theme) -> Line<'static> {
    let prefix = if selected { "> " } else { "  " };
    let marker = if row.chosen { "* " } else { "  " };

    let mut version_style = if row.chosen {
        Style::default().fg(theme.chosen)
    } else if selected {
        Style::default().fg(theme.cursor)
    } else {
        Style::default().fg(theme.text)
    };
    if selected {
        version_style = version_style.add_modifier(Modifier::BOLD);
    }

    let status_style = match row.status {
        Status::Downloaded => Style::default().fg(theme.downloaded),
        Status::NotDownloaded => Style::default().fg(theme.text),
        Status::Downloading { .. } | Status::Cancelling | Status::Removing => {
            Style::default().fg(theme.busy)
        }
    };

    Line::from(vec![
        Span::styled(prefix, version_style),
        Span::styled(marker, Style::default().fg(theme.chosen)),
        Span::styled(format!("{:<width$}  ", row.release.version), version_style),
        Span::styled(
            format!("{}  ", row.release.published_on()),
            Style::default().fg(theme.muted),
        ),
        Span::styled(row_label(row.status), status_style),
    ])
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let line = match &app.message {
        Some(notice) => {
            let color = match notice.kind {
                NoticeKind::Network | NoticeKind::Storage => theme.failure,
                NoticeKind::Info => theme.text,
            };
            Line::from(Span::styled(format!(" {}", notice.message), Style::default().fg(color)))
        }
        None => {
            let chosen = app
                .rows
                .iter()
                .find(|row| row.chosen)
                .map_or_else(|| String::from("none"), |row| row.release.version.clone());
            Line::from(vec![
                Span::styled(" Chosen: ", Style::default().fg(theme.muted)),
                Span::styled(chosen, Style::default().fg(theme.chosen)),
            ])
        }
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border));
    frame.render_widget(Paragraph::new(line).block(block), area);
}
