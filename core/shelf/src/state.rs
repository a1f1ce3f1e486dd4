//! Per-release state and in-flight task handles.

use std::collections::HashMap;

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::release::{BlobRef, ReleaseId};

/// Mapping from each known release to its current state.
pub type StateMap = HashMap<ReleaseId, VersionState>;

/// Identifier of one spawned download task.
pub type TaskId = u64;

/// State of a single release.
///
/// Matches over this enum are written out in full so that adding a variant
/// forces every consumer to be revisited.
#[derive(Debug, Clone)]
pub enum VersionState {
    NotDownloaded,
    /// A download task is running. `percent` is `None` until the total size
    /// is known.
    Downloading {
        handle: TaskHandle,
        percent: Option<u8>,
    },
    /// The artifact is present in the store.
    Downloaded(BlobRef),
    /// Stop was requested; the task has not finished yet.
    Cancelling { handle: TaskHandle },
    /// The artifact is being deleted.
    Removing(BlobRef),
}

impl VersionState {
    /// Returns the payload-free projection of this state.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::NotDownloaded => Status::NotDownloaded,
            Self::Downloading { percent, .. } => Status::Downloading { percent: *percent },
            Self::Downloaded(_) => Status::Downloaded,
            Self::Cancelling { .. } => Status::Cancelling,
            Self::Removing(_) => Status::Removing,
        }
    }

    /// Returns the running task, if this state owns one.
    #[must_use]
    pub fn task(&self) -> Option<&TaskHandle> {
        match self {
            Self::Downloading { handle, .. } | Self::Cancelling { handle } => Some(handle),
            Self::NotDownloaded | Self::Downloaded(_) | Self::Removing(_) => None,
        }
    }

    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded(_))
    }
}

/// Cloneable view of a [`VersionState`] without task handles or blob names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    NotDownloaded,
    Downloading { percent: Option<u8> },
    Downloaded,
    Cancelling,
    Removing,
}

impl Status {
    /// Short label used by the CLI and TUI.
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::NotDownloaded => String::from("not downloaded"),
            Self::Downloading { percent: Some(p) } => format!("loading: {p}%"),
            Self::Downloading { percent: None } => String::from("loading..."),
            Self::Downloaded => String::from("downloaded"),
            Self::Cancelling => String::from("cancelling..."),
            Self::Removing => String::from("removing..."),
        }
    }

    /// Returns `true` while some task is still working on the release.
    #[must_use]
    pub fn is_busy(self) -> bool {
        match self {
            Self::Downloading { .. } | Self::Cancelling | Self::Removing => true,
            Self::NotDownloaded | Self::Downloaded => false,
        }
    }
}

/// Computes the download percentage from a progress callback.
///
/// Returns `None` when the total is unknown (zero); the result never exceeds
/// 100 even if the server under-reported the length.
#[must_use]
pub fn percent(received: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let value = (u128::from(received) * 100 / u128::from(total)).min(100);
    u8::try_from(value).ok()
}

/// Reference to a spawned, cancellable task.
///
/// Cancellation is split in two: [`request_stop`](Self::request_stop) signals
/// the task and returns immediately, [`stopped`](Self::stopped) waits until
/// the task's future has actually finished or been dropped.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    stop: CancellationToken,
    finished: CancellationToken,
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskHandle {}

impl TaskHandle {
    #[must_use]
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            stop: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Asks the task to stop. Idempotent and non-blocking.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolves once a stop has been requested.
    pub async fn stop_requested(&self) {
        self.stop.cancelled().await;
    }

    /// Resolves once the task has terminated.
    pub async fn stopped(&self) {
        self.finished.cancelled().await;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Guard to be held by the task body; dropping it marks the task stopped.
    #[must_use]
    pub fn finish_guard(&self) -> DropGuard {
        self.finished.clone().drop_guard()
    }
}
