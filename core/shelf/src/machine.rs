//! The version state machine.
//!
//! [`Ledger`] owns the state map and the chosen release and is the only
//! place either is mutated. Every transition checks the expected from-state
//! (and, for task-driven transitions, the task id) before applying, so stale
//! or duplicated triggers fall through as [`Transition::Ignored`].
//!
//! The ledger is synchronous. The manager wraps it in a mutex, runs a closure
//! against it and broadcasts whatever events the closure queued once the
//! lock is released.
//!
//! ## Revisions
//!
//! Each entry carries a revision stamped from a ledger-wide clock. A refresh
//! snapshots the revisions before verifying artifacts and hands them back to
//! [`Ledger::commit`], which keeps the live state of every entry that moved
//! in the meantime.

use std::collections::HashMap;

use tracing::debug;

use crate::chosen::ChosenTracker;
use crate::events::{ReleaseView, ShelfEvent};
use crate::reconcile::{self, Cleanup};
use crate::release::{BlobRef, ReleaseId};
use crate::state::{StateMap, Status, TaskHandle, TaskId, VersionState, percent};

/// Per-entry revision numbers captured by [`Ledger::snapshot`].
pub type Revisions = HashMap<ReleaseId, u64>;

/// Outcome of a single transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

impl Transition {
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// State map, chosen release and the events produced by mutating them.
#[derive(Debug, Default)]
pub struct Ledger {
    states: StateMap,
    revisions: Revisions,
    clock: u64,
    chosen: ChosenTracker,
    pending: Vec<ShelfEvent>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn states(&self) -> &StateMap {
        &self.states
    }

    #[must_use]
    pub fn state(&self, release: &ReleaseId) -> Option<&VersionState> {
        self.states.get(release)
    }

    #[must_use]
    pub fn chosen(&self) -> Option<&ReleaseId> {
        self.chosen.current()
    }

    /// Returns the releases in display order together with their status.
    #[must_use]
    pub fn views(&self) -> Vec<ReleaseView> {
        let mut views: Vec<ReleaseView> = self
            .states
            .iter()
            .map(|(release, state)| ReleaseView {
                release: release.clone(),
                status: state.status(),
                chosen: self.chosen.is_chosen(release),
            })
            .collect();
        views.sort_by(|a, b| ReleaseId::display_order(&a.release, &b.release));
        views
    }

    /// NotDownloaded (or absent) → Downloading.
    pub fn begin_download(&mut self, release: &ReleaseId, handle: TaskHandle) -> Transition {
        match self.states.get(release) {
            None | Some(VersionState::NotDownloaded) => {
                self.set(
                    release,
                    VersionState::Downloading {
                        handle,
                        percent: None,
                    },
                );
                Transition::Applied
            }
            Some(
                VersionState::Downloading { .. }
                | VersionState::Downloaded(_)
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            ) => Transition::Ignored,
        }
    }

    /// Downloading → Downloading with an updated percentage.
    ///
    /// Unchanged percentages are not republished.
    pub fn record_progress(
        &mut self,
        release: &ReleaseId,
        task: TaskId,
        received: u64,
        total: u64,
    ) -> Transition {
        let next = percent(received, total);
        let handle = match self.states.get(release) {
            Some(VersionState::Downloading { handle, percent }) if handle.id() == task => {
                if *percent == next {
                    return Transition::Ignored;
                }
                handle.clone()
            }
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloading { .. }
                | VersionState::Downloaded(_)
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => return Transition::Ignored,
        };
        self.set(
            release,
            VersionState::Downloading {
                handle,
                percent: next,
            },
        );
        Transition::Applied
    }

    /// Downloading → Downloaded, only for the task that owns the entry.
    pub fn complete_download(
        &mut self,
        release: &ReleaseId,
        task: TaskId,
        blob: BlobRef,
    ) -> Transition {
        if !self.is_downloading_by(release, task) {
            return Transition::Ignored;
        }
        self.set(release, VersionState::Downloaded(blob));
        Transition::Applied
    }

    /// Downloading → NotDownloaded after the task failed.
    pub fn fail_download(&mut self, release: &ReleaseId, task: TaskId) -> Transition {
        if !self.is_downloading_by(release, task) {
            return Transition::Ignored;
        }
        self.set(release, VersionState::NotDownloaded);
        Transition::Applied
    }

    /// Downloading → Cancelling. Returns the handle the caller must stop.
    pub fn request_cancel(&mut self, release: &ReleaseId) -> Option<TaskHandle> {
        let handle = match self.states.get(release) {
            Some(VersionState::Downloading { handle, .. }) => handle.clone(),
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloaded(_)
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => return None,
        };
        self.set(
            release,
            VersionState::Cancelling {
                handle: handle.clone(),
            },
        );
        Some(handle)
    }

    /// Cancelling → NotDownloaded once the matching task has stopped.
    pub fn confirm_cancelled(&mut self, release: &ReleaseId, task: TaskId) -> Transition {
        match self.states.get(release) {
            Some(VersionState::Cancelling { handle }) if handle.id() == task => {
                self.set(release, VersionState::NotDownloaded);
                Transition::Applied
            }
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloading { .. }
                | VersionState::Downloaded(_)
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => Transition::Ignored,
        }
    }

    /// Downloaded → Removing. Returns the blob the caller must delete.
    pub fn begin_remove(&mut self, release: &ReleaseId) -> Option<BlobRef> {
        let blob = match self.states.get(release) {
            Some(VersionState::Downloaded(blob)) => blob.clone(),
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloading { .. }
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => return None,
        };
        self.set(release, VersionState::Removing(blob.clone()));
        Some(blob)
    }

    /// Removing → NotDownloaded, whether or not the delete succeeded.
    pub fn complete_remove(&mut self, release: &ReleaseId, blob: &BlobRef) -> Transition {
        match self.states.get(release) {
            Some(VersionState::Removing(current)) if current == blob => {
                self.set(release, VersionState::NotDownloaded);
                Transition::Applied
            }
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloading { .. }
                | VersionState::Downloaded(_)
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => Transition::Ignored,
        }
    }

    /// Chooses a downloaded release, or un-chooses it if already chosen.
    pub fn toggle_chosen(&mut self, release: &ReleaseId) -> Transition {
        if !self.chosen.toggle(release, &self.states) {
            return Transition::Ignored;
        }
        debug!(release = %release, chosen = self.chosen.is_chosen(release), "toggled chosen release");
        self.pending.push(ShelfEvent::ChosenChanged {
            chosen: self.chosen.current().cloned(),
        });
        Transition::Applied
    }

    /// Accepts the chosen release read from the record store on cold start.
    pub fn accept_chosen(&mut self, candidate: Option<ReleaseId>) -> Transition {
        if self.chosen.accept_loaded(candidate, &self.states) {
            self.pending.push(ShelfEvent::ChosenChanged {
                chosen: self.chosen.current().cloned(),
            });
            Transition::Applied
        } else {
            Transition::Ignored
        }
    }

    /// Returns `true` if a blob written by the (stale) task `task` for
    /// `release` is still referenced by a live state and must be kept.
    #[must_use]
    pub fn blob_in_use(&self, release: &ReleaseId, task: TaskId) -> bool {
        match self.states.get(release) {
            Some(VersionState::Downloaded(_)) => true,
            Some(VersionState::Downloading { handle, .. } | VersionState::Cancelling { handle }) => {
                handle.id() != task
            }
            Some(VersionState::NotDownloaded | VersionState::Removing(_)) | None => false,
        }
    }

    /// Copies the state map and its revisions for an off-lock reconcile.
    #[must_use]
    pub fn snapshot(&self) -> (StateMap, Revisions) {
        (self.states.clone(), self.revisions.clone())
    }

    /// Replaces the state map with a reconciled one.
    ///
    /// Entries whose revision differs from `seen` keep their live state.
    /// Live entries absent from `planned` are dropped and returned as cleanup
    /// actions.
    pub fn commit(&mut self, planned: StateMap, seen: &Revisions) -> Vec<Cleanup> {
        self.clock += 1;
        let stamp = self.clock;

        let mut next = StateMap::with_capacity(planned.len());
        let mut revisions = Revisions::with_capacity(planned.len());
        for (release, state) in planned {
            let live_revision = self.revisions.get(&release).copied();
            let moved = live_revision.is_some() && live_revision != seen.get(&release).copied();
            if moved && let Some(live) = self.states.remove(&release) {
                debug!(release = %release, "kept concurrent transition during reconcile");
                revisions.insert(release.clone(), live_revision.unwrap_or(stamp));
                next.insert(release, live);
                continue;
            }
            revisions.insert(release.clone(), stamp);
            next.insert(release, state);
        }

        let previous = std::mem::replace(&mut self.states, next);
        self.revisions = revisions;
        let cleanup = reconcile::orphan_cleanup(
            previous
                .iter()
                .filter(|(release, _)| !self.states.contains_key(*release)),
        );

        let mut releases: Vec<_> = self
            .states
            .iter()
            .map(|(release, state)| (release.clone(), state.status()))
            .collect();
        releases.sort_by(|a, b| ReleaseId::display_order(&a.0, &b.0));
        self.pending.push(ShelfEvent::Reconciled { releases });

        if self.chosen.retain_valid(&self.states) {
            self.pending.push(ShelfEvent::ChosenChanged { chosen: None });
        }
        cleanup
    }

    /// Returns `true` if the chosen record changed since the last call.
    pub fn take_chosen_dirty(&mut self) -> bool {
        self.chosen.take_dirty()
    }

    /// Removes and returns the queued events.
    pub fn drain_events(&mut self) -> Vec<ShelfEvent> {
        std::mem::take(&mut self.pending)
    }

    fn is_downloading_by(&self, release: &ReleaseId, task: TaskId) -> bool {
        match self.states.get(release) {
            Some(VersionState::Downloading { handle, .. }) => handle.id() == task,
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloaded(_)
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => false,
        }
    }

    fn set(&mut self, release: &ReleaseId, state: VersionState) {
        let status = state.status();
        let previous = self.states.insert(release.clone(), state);
        self.clock += 1;
        self.revisions.insert(release.clone(), self.clock);
        debug!(release = %release, status = %status.label(), "state transition");
        self.pending.push(ShelfEvent::StateChanged {
            release: release.clone(),
            status,
        });

        let left_downloaded = previous.as_ref().is_some_and(VersionState::is_downloaded)
            && status != Status::Downloaded;
        if left_downloaded && self.chosen.release_left_downloaded(release) {
            self.pending.push(ShelfEvent::ChosenChanged { chosen: None });
        }
    }
}
