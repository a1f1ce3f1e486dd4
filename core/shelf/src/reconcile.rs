//! Reconciliation of a fetched release list against known local state.
//!
//! [`reconcile`] is a pure planning step: it reads the old map, checks the
//! store for every entry that claims to be downloaded and returns the next
//! map plus the cleanup actions for releases that disappeared upstream. It
//! never mutates anything; the manager commits the plan and runs the
//! cleanup.
//!
//! ## Rules
//!
//! | Old state | In new list | Result |
//! |---|---|---|
//! | absent | yes | `NotDownloaded` |
//! | `Downloaded(blob)` | yes | kept if the blob still exists, else `NotDownloaded` |
//! | anything else | yes | carried over |
//! | `Downloaded(blob)` | no | dropped, blob deleted |
//! | `Downloading` | no | dropped, task stopped |
//! | `NotDownloaded`, `Cancelling`, `Removing` | no | dropped |

use std::collections::HashSet;

use futures_util::{StreamExt, stream};
use tracing::warn;

use crate::release::{BlobRef, ReleaseId};
use crate::state::{StateMap, TaskHandle, VersionState};
use crate::store::ArtifactStore;

/// Side effect scheduled for a release that left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    DeleteArtifact { release: ReleaseId, blob: BlobRef },
    CancelDownload { release: ReleaseId, handle: TaskHandle },
}

/// Result of planning a reconciliation.
#[derive(Debug)]
pub struct Reconciliation {
    pub states: StateMap,
    pub cleanup: Vec<Cleanup>,
}

/// Plans the next state map for `releases`.
///
/// Existence checks for downloaded entries run concurrently, at most `limit`
/// at a time. A check that fails counts as "not present".
pub async fn reconcile(
    old: &StateMap,
    releases: &[ReleaseId],
    store: &dyn ArtifactStore,
    limit: usize,
) -> Reconciliation {
    let releases = distinct(releases);
    let mut states = StateMap::with_capacity(releases.len());
    let mut to_verify = Vec::new();

    for release in &releases {
        match old.get(release) {
            None => {
                states.insert(release.clone(), VersionState::NotDownloaded);
            }
            Some(VersionState::Downloaded(blob)) => to_verify.push((release.clone(), blob.clone())),
            Some(
                state @ (VersionState::NotDownloaded
                | VersionState::Downloading { .. }
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_)),
            ) => {
                states.insert(release.clone(), state.clone());
            }
        }
    }

    let verified: Vec<(ReleaseId, BlobRef, bool)> = stream::iter(to_verify)
        .map(|(release, blob)| async move {
            let present = blob_present(store, &release, &blob).await;
            (release, blob, present)
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    for (release, blob, present) in verified {
        let state = if present {
            VersionState::Downloaded(blob)
        } else {
            VersionState::NotDownloaded
        };
        states.insert(release, state);
    }

    let keep: HashSet<&ReleaseId> = releases.iter().collect();
    let cleanup = orphan_cleanup(old.iter().filter(|(release, _)| !keep.contains(release)));

    Reconciliation { states, cleanup }
}

/// Builds the initial map from a snapshot on cold start: every release is
/// `Downloaded` if its blob is in the store, `NotDownloaded` otherwise.
pub async fn seed(releases: &[ReleaseId], store: &dyn ArtifactStore, limit: usize) -> StateMap {
    stream::iter(distinct(releases))
        .map(|release| async move {
            let state = match store.locate(&release).await {
                Ok(Some(blob)) => VersionState::Downloaded(blob),
                Ok(None) => VersionState::NotDownloaded,
                Err(e) => {
                    warn!(release = %release, error = %e, "artifact check failed, treating as absent");
                    VersionState::NotDownloaded
                }
            };
            (release, state)
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

/// Cleanup actions for entries being dropped from the map.
pub fn orphan_cleanup<'a>(
    orphans: impl IntoIterator<Item = (&'a ReleaseId, &'a VersionState)>,
) -> Vec<Cleanup> {
    orphans
        .into_iter()
        .filter_map(|(release, state)| match state {
            VersionState::Downloaded(blob) => Some(Cleanup::DeleteArtifact {
                release: release.clone(),
                blob: blob.clone(),
            }),
            VersionState::Downloading { handle, .. } => Some(Cleanup::CancelDownload {
                release: release.clone(),
                handle: handle.clone(),
            }),
            VersionState::NotDownloaded
            | VersionState::Cancelling { .. }
            | VersionState::Removing(_) => None,
        })
        .collect()
}

/// Drops repeated releases, keeping the first occurrence.
#[must_use]
pub fn distinct(releases: &[ReleaseId]) -> Vec<ReleaseId> {
    let mut seen = HashSet::with_capacity(releases.len());
    releases
        .iter()
        .filter(|release| seen.insert(*release))
        .cloned()
        .collect()
}

async fn blob_present(store: &dyn ArtifactStore, release: &ReleaseId, blob: &BlobRef) -> bool {
    match store.exists(blob).await {
        Ok(present) => present,
        Err(e) => {
            warn!(release = %release, error = %e, "artifact check failed, treating as absent");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keeps_first_occurrence_order() {
        let a = ReleaseId::new("1.0", 1);
        let b = ReleaseId::new("1.1", 2);
        let deduped = distinct(&[a.clone(), b.clone(), a.clone()]);
        assert_eq!(deduped, vec![a, b]);
    }

    #[test]
    fn orphan_cleanup_by_state() {
        let downloaded = ReleaseId::new("1.0", 1);
        let downloading = ReleaseId::new("1.1", 2);
        let cancelling = ReleaseId::new("1.2", 3);
        let handle = TaskHandle::new(8);
        let old: StateMap = [
            (
                downloaded.clone(),
                VersionState::Downloaded(BlobRef::new("1.0-1.jar")),
            ),
            (
                downloading.clone(),
                VersionState::Downloading {
                    handle: handle.clone(),
                    percent: Some(3),
                },
            ),
            (
                cancelling,
                VersionState::Cancelling {
                    handle: TaskHandle::new(9),
                },
            ),
        ]
        .into_iter()
        .collect();

        let mut cleanup = orphan_cleanup(&old);
        cleanup.sort_by_key(|c| match c {
            Cleanup::DeleteArtifact { .. } => 0,
            Cleanup::CancelDownload { .. } => 1,
        });
        assert_eq!(
            cleanup,
            vec![
                Cleanup::DeleteArtifact {
                    release: downloaded,
                    blob: BlobRef::new("1.0-1.jar"),
                },
                Cleanup::CancelDownload {
                    release: downloading,
                    handle,
                },
            ]
        );
    }
}
