//! Events published by the version manager.
//!
//! The core never talks to a UI directly. Every applied transition produces
//! one or more [`ShelfEvent`]s which the manager broadcasts to subscribers.

use crate::release::ReleaseId;
use crate::state::Status;

/// Change notification broadcast to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShelfEvent {
    /// A single release changed state (or was first added by a download).
    StateChanged { release: ReleaseId, status: Status },
    /// Reconciliation replaced the whole map. Releases are in display order.
    Reconciled { releases: Vec<(ReleaseId, Status)> },
    /// The chosen release changed.
    ChosenChanged { chosen: Option<ReleaseId> },
    /// Something failed; shown to the user as a transient message.
    Notice(Notice),
}

/// What a [`Notice`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Network,
    Storage,
    Info,
}

/// User-visible transient message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One row of the display projection returned by the manager.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReleaseView {
    #[serde(flatten)]
    pub release: ReleaseId,
    #[serde(flatten)]
    pub status: Status,
    pub chosen: bool,
}
