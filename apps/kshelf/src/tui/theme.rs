//! Colors for the release screen, picked for dark or light terminals.

use ratatui::style::Color;

/// Palette keyed by what is being drawn rather than by hue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub title: Color,
    pub text: Color,
    /// Dates, hints and empty-list messages.
    pub muted: Color,
    pub border: Color,
    /// The row under the cursor.
    pub cursor: Color,
    /// The chosen release's marker and row.
    pub chosen: Color,
    /// Status label of downloaded releases.
    pub downloaded: Color,
    /// Status label while a task runs (loading, cancelling, removing).
    pub busy: Color,
    /// Status bar text for failures.
    pub failure: Color,
}

/// Terminal background brightness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Dark,
    Light,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    #[must_use]
    pub fn dark() -> Self {
        Self {
            title: Color::Cyan,
            text: Color::White,
            muted: Color::DarkGray,
            border: Color::DarkGray,
            cursor: Color::LightBlue,
            chosen: Color::Green,
            downloaded: Color::Green,
            busy: Color::Yellow,
            failure: Color::Red,
        }
    }

    #[must_use]
    pub fn light() -> Self {
        Self {
            title: Color::Blue,
            text: Color::Black,
            muted: Color::Gray,
            border: Color::Gray,
            cursor: Color::Blue,
            chosen: Color::Rgb(0, 128, 0),
            downloaded: Color::Rgb(0, 128, 0),
            busy: Color::Rgb(204, 153, 0),
            failure: Color::Rgb(139, 0, 0),
        }
    }

    #[must_use]
    pub fn for_background(background: Background) -> Self {
        match background {
            Background::Dark => Self::dark(),
            Background::Light => Self::light(),
        }
    }

    /// Picks a theme from `COLORFGBG`, falling back to dark.
    #[must_use]
    pub fn detect() -> Self {
        let background = std::env::var("COLORFGBG")
            .ok()
            .and_then(|value| background_from_colorfgbg(&value))
            .unwrap_or(Background::Dark);
        Self::for_background(background)
    }
}

/// Reads the background from a `COLORFGBG` value (`fg;bg[;...]`).
///
/// ANSI background 7 (light gray) and the bright range 8-15 count as light.
/// Non-numeric backgrounds such as `default` give `None`.
fn background_from_colorfgbg(value: &str) -> Option<Background> {
    let bg: u8 = value.split(';').nth(1)?.trim().parse().ok()?;
    if bg == 7 || bg >= 8 {
        Some(Background::Light)
    } else {
        Some(Background::Dark)
    }
}
