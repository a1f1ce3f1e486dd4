//! Chosen-release tracking.
//!
//! At most one release is "chosen" (the active compiler). The tracker only
//! ever points at a release whose state is [`VersionState::Downloaded`]; the
//! ledger calls into it whenever a release leaves that state.

use crate::release::ReleaseId;
use crate::state::{StateMap, VersionState};

/// Holds the chosen release and remembers whether it needs persisting.
#[derive(Debug, Default)]
pub struct ChosenTracker {
    current: Option<ReleaseId>,
    dirty: bool,
}

impl ChosenTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<&ReleaseId> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn is_chosen(&self, release: &ReleaseId) -> bool {
        self.current.as_ref() == Some(release)
    }

    /// Chooses `release`, or clears the choice if it is already chosen.
    ///
    /// Returns `false` without changing anything when the release is not
    /// downloaded.
    pub fn toggle(&mut self, release: &ReleaseId, states: &StateMap) -> bool {
        if !states.get(release).is_some_and(VersionState::is_downloaded) {
            return false;
        }
        if self.is_chosen(release) {
            self.current = None;
        } else {
            self.current = Some(release.clone());
        }
        self.dirty = true;
        true
    }

    /// Accepts a persisted choice if it still refers to a downloaded release.
    ///
    /// A rejected candidate marks the tracker dirty so the cleared value gets
    /// written back.
    pub fn accept_loaded(&mut self, candidate: Option<ReleaseId>, states: &StateMap) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        if states.get(&candidate).is_some_and(VersionState::is_downloaded) {
            self.current = Some(candidate);
            true
        } else {
            self.current = None;
            self.dirty = true;
            false
        }
    }

    /// Called when `release` leaves the downloaded state. Returns `true` if
    /// the choice was cleared.
    pub fn release_left_downloaded(&mut self, release: &ReleaseId) -> bool {
        if self.is_chosen(release) {
            self.current = None;
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Clears the choice if it no longer maps to a downloaded release.
    pub fn retain_valid(&mut self, states: &StateMap) -> bool {
        match &self.current {
            Some(chosen) if !states.get(chosen).is_some_and(VersionState::is_downloaded) => {
                self.current = None;
                self.dirty = true;
                true
            }
            Some(_) | None => false,
        }
    }

    /// Returns and resets the "needs persisting" flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
