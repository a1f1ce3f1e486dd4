//! The version manager: the live engine behind every front end.
//!
//! [`VersionManager`] owns the [`Ledger`] and the collaborators. All ledger
//! mutations go through [`VersionManager::apply`], which runs a closure under
//! a short synchronous lock and broadcasts the queued [`ShelfEvent`]s after
//! releasing it. Nothing holds the lock across an await.
//!
//! ## Tasks
//!
//! Downloads, deletes and cancel confirmations run as spawned tokio tasks.
//! A download task owns the finish guard of its [`TaskHandle`], so
//! [`TaskHandle::stopped`] resolves exactly when the task is gone. Cancel
//! confirmation awaits that before moving the entry to `NotDownloaded`.
//!
//! ## Records
//!
//! The chosen record is written whenever the ledger reports it changed.
//! Writes are serialised and always store the value current at write time.
//! The snapshot is rewritten after every successful registry fetch.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> kshelf_core::ShelfResult<()> {
//! use kshelf_core::{ShelfConfig, VersionManager};
//!
//! let config = ShelfConfig::load()?;
//! let manager = VersionManager::from_config(&config)?;
//! manager.load().await?;
//! for row in manager.releases() {
//!     println!("{} {}", row.release, row.status.label());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ShelfConfig;
use crate::errors::{ShelfError, ShelfResult};
use crate::events::{Notice, NoticeKind, ReleaseView, ShelfEvent};
use crate::machine::{Ledger, Transition};
use crate::maven::MavenCentral;
use crate::reconcile::{self, Cleanup};
use crate::registry::{ArtifactSource, ReleaseRegistry};
use crate::release::{BlobRef, ReleaseId};
use crate::state::{Status, TaskHandle, TaskId, VersionState};
use crate::store::{ArtifactStore, FsStore, RecordStore};

/// Capacity of the event channel. Slow subscribers see `Lagged` and should
/// re-read [`VersionManager::releases`].
const EVENT_CAPACITY: usize = 256;

/// The collaborators a manager drives.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ReleaseRegistry>,
    pub source: Arc<dyn ArtifactSource>,
    pub store: Arc<dyn ArtifactStore>,
    pub records: Arc<dyn RecordStore>,
}

/// Cloneable handle to the shared engine.
#[derive(Clone)]
pub struct VersionManager {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Mutex<Ledger>,
    events: broadcast::Sender<ShelfEvent>,
    parts: Collaborators,
    verify_limit: usize,
    next_task: AtomicU64,
    chosen_dirty: AtomicBool,
    refresh_gate: tokio::sync::Mutex<()>,
    chosen_writer: tokio::sync::Mutex<()>,
    tasks: TaskTracker,
}

impl VersionManager {
    #[must_use]
    pub fn new(parts: Collaborators, verify_limit: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                ledger: Mutex::new(Ledger::new()),
                events,
                parts,
                verify_limit: verify_limit.max(1),
                next_task: AtomicU64::new(1),
                chosen_dirty: AtomicBool::new(false),
                refresh_gate: tokio::sync::Mutex::new(()),
                chosen_writer: tokio::sync::Mutex::new(()),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Wires Maven Central and the filesystem store from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn from_config(config: &ShelfConfig) -> ShelfResult<Self> {
        let maven = Arc::new(MavenCentral::new(config)?);
        let store = Arc::new(FsStore::new(config));
        Ok(Self::new(
            Collaborators {
                registry: maven.clone(),
                source: maven,
                store: store.clone(),
                records: store,
            },
            config.verify_concurrency,
        ))
    }

    /// Subscribes to state changes. Events published before the call are not
    /// replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ShelfEvent> {
        self.inner.events.subscribe()
    }

    /// Display projection: every known release, newest first.
    #[must_use]
    pub fn releases(&self) -> Vec<ReleaseView> {
        self.lock().views()
    }

    #[must_use]
    pub fn status(&self, release: &ReleaseId) -> Option<Status> {
        self.lock().state(release).map(VersionState::status)
    }

    #[must_use]
    pub fn chosen(&self) -> Option<ReleaseId> {
        self.lock().chosen().cloned()
    }

    /// Blob of a downloaded release.
    #[must_use]
    pub fn downloaded_blob(&self, release: &ReleaseId) -> Option<BlobRef> {
        match self.lock().state(release) {
            Some(VersionState::Downloaded(blob)) => Some(blob.clone()),
            Some(
                VersionState::NotDownloaded
                | VersionState::Downloading { .. }
                | VersionState::Cancelling { .. }
                | VersionState::Removing(_),
            )
            | None => None,
        }
    }

    /// Looks a release up by version. Without a timestamp the newest release
    /// carrying that version wins.
    #[must_use]
    pub fn find(&self, version: &str, timestamp: Option<i64>) -> Option<ReleaseId> {
        self.lock()
            .states()
            .keys()
            .filter(|release| release.version == version)
            .filter(|release| timestamp.is_none_or(|ts| release.timestamp == ts))
            .max_by_key(|release| release.timestamp)
            .cloned()
    }

    /// Cold start: seeds from the persisted snapshot, or refreshes from the
    /// registry when there is none, then restores the chosen release.
    ///
    /// # Errors
    ///
    /// Returns the registry error if there is no snapshot and the fetch
    /// fails. The chosen record is left untouched in that case.
    pub async fn load(&self) -> ShelfResult<()> {
        match self.inner.parts.records.load_snapshot().await {
            Some(releases) => {
                info!(count = releases.len(), "seeding from snapshot");
                let (_, seen) = self.lock().snapshot();
                let states = reconcile::seed(
                    &releases,
                    self.inner.parts.store.as_ref(),
                    self.inner.verify_limit,
                )
                .await;
                let cleanup = self.apply(|ledger| ledger.commit(states, &seen));
                self.run_cleanup(cleanup);
            }
            None => {
                info!("no snapshot, fetching release list");
                self.refresh().await?;
            }
        }

        let candidate = self.inner.parts.records.load_chosen().await;
        self.apply(|ledger| ledger.accept_chosen(candidate));
        self.save_chosen_if_dirty().await;
        Ok(())
    }

    /// Fetches the registry and reconciles. Returns the number of releases.
    ///
    /// Concurrent refreshes run one after another.
    ///
    /// # Errors
    ///
    /// Returns the registry error; the state map and snapshot are untouched.
    pub async fn refresh(&self) -> ShelfResult<usize> {
        let _gate = self.inner.refresh_gate.lock().await;

        let releases = match self.inner.parts.registry.fetch_releases().await {
            Ok(releases) => reconcile::distinct(&releases),
            Err(e) => {
                warn!(error = %e, "registry fetch failed, keeping known state");
                self.notify(NoticeKind::Network, format!("Refresh failed: {e}"));
                return Err(e);
            }
        };

        let (old, seen) = self.lock().snapshot();
        let plan = reconcile::reconcile(
            &old,
            &releases,
            self.inner.parts.store.as_ref(),
            self.inner.verify_limit,
        )
        .await;
        drop(old);
        let cleanup = self.apply(|ledger| ledger.commit(plan.states, &seen));
        info!(count = releases.len(), orphans = cleanup.len(), "reconciled release list");
        self.run_cleanup(cleanup);

        if let Err(e) = self.inner.parts.records.save_snapshot(&releases).await {
            self.report_record_failure("snapshot", &e);
        }
        self.save_chosen_if_dirty().await;
        Ok(releases.len())
    }

    /// Starts downloading `release`. Ignored unless it is not downloaded.
    pub fn download(&self, release: &ReleaseId) -> Transition {
        let task_id: TaskId = self.inner.next_task.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::new(task_id);
        let outcome = self.apply(|ledger| ledger.begin_download(release, handle.clone()));
        if !outcome.is_applied() {
            debug!(release = %release, "download ignored");
            return outcome;
        }

        info!(release = %release, task = task_id, "download started");
        let guard = handle.finish_guard();
        let manager = self.clone();
        let release = release.clone();
        self.inner.tasks.spawn(async move {
            let _guard = guard;
            manager.run_download(release, handle).await;
        });
        outcome
    }

    /// Requests cancellation of a running download. The entry moves to
    /// `Cancelling` now and to `NotDownloaded` once the task has ended.
    pub fn cancel(&self, release: &ReleaseId) -> Transition {
        let Some(handle) = self.apply(|ledger| ledger.request_cancel(release)) else {
            debug!(release = %release, "cancel ignored");
            return Transition::Ignored;
        };

        info!(release = %release, task = handle.id(), "cancelling download");
        handle.request_stop();
        let manager = self.clone();
        let release = release.clone();
        self.inner.tasks.spawn(async move {
            handle.stopped().await;
            manager.apply(|ledger| ledger.confirm_cancelled(&release, handle.id()));
        });
        Transition::Applied
    }

    /// Removes a downloaded release. Clears the chosen release if needed.
    pub async fn remove(&self, release: &ReleaseId) -> Transition {
        let Some(blob) = self.apply(|ledger| ledger.begin_remove(release)) else {
            debug!(release = %release, "remove ignored");
            return Transition::Ignored;
        };

        info!(release = %release, blob = %blob, "removing artifact");
        let manager = self.clone();
        let target = release.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = manager.inner.parts.store.delete(&blob).await {
                warn!(release = %target, error = %e, "failed to delete artifact");
                manager.notify(NoticeKind::Storage, format!("Failed to delete {target}: {e}"));
            }
            manager.apply(|ledger| ledger.complete_remove(&target, &blob));
        });
        self.save_chosen_if_dirty().await;
        Transition::Applied
    }

    /// Chooses a downloaded release, or clears the choice if it is chosen.
    pub async fn toggle_chosen(&self, release: &ReleaseId) -> Transition {
        let outcome = self.apply(|ledger| ledger.toggle_chosen(release));
        self.save_chosen_if_dirty().await;
        outcome
    }

    /// Clears the chosen release, if any.
    pub async fn clear_chosen(&self) -> Transition {
        match self.chosen() {
            Some(chosen) => self.toggle_chosen(&chosen).await,
            None => Transition::Ignored,
        }
    }

    /// Waits until every spawned download, delete and cancel confirmation
    /// has finished. Tasks started while waiting are waited for too.
    pub async fn wait_idle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Waits until the status of `release` satisfies `predicate` and returns
    /// that status. `None` means the release is unknown.
    pub async fn wait_for(
        &self,
        release: &ReleaseId,
        predicate: impl Fn(Option<Status>) -> bool,
    ) -> Option<Status> {
        let mut events = self.subscribe();
        loop {
            let current = self.status(release);
            if predicate(current) {
                return current;
            }
            loop {
                match events.recv().await {
                    Ok(ShelfEvent::StateChanged { release: changed, .. }) if &changed == release => {
                        break;
                    }
                    Ok(ShelfEvent::Reconciled { .. }) | Err(RecvError::Lagged(_)) => break,
                    Ok(_) => {}
                    Err(RecvError::Closed) => return self.status(release),
                }
            }
        }
    }

    /// Runs `f` against the ledger and publishes what it queued.
    ///
    /// Events go out while the ledger is still locked, so subscribers see
    /// them in the order the transitions were applied. `send` never waits.
    fn apply<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut ledger = self.lock();
        let result = f(&mut ledger);
        if ledger.take_chosen_dirty() {
            self.inner.chosen_dirty.store(true, Ordering::SeqCst);
        }
        for event in ledger.drain_events() {
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, kind: NoticeKind, message: String) {
        let _ = self.inner.events.send(ShelfEvent::Notice(Notice::new(kind, message)));
    }

    async fn run_download(&self, release: ReleaseId, handle: TaskHandle) {
        let task = handle.id();
        let result = tokio::select! {
            biased;
            () = handle.stop_requested() => {
                debug!(release = %release, task, "download task stopped");
                return;
            }
            result = self.fetch_and_store(&release, task) => result,
        };

        match result {
            Ok(blob) => {
                let outcome = self.apply(|ledger| ledger.complete_download(&release, task, blob.clone()));
                if outcome.is_applied() {
                    info!(release = %release, blob = %blob, "download finished");
                    return;
                }
                let in_use = self.lock().blob_in_use(&release, task);
                if in_use {
                    debug!(release = %release, task, "stale download finished, blob owned elsewhere");
                    return;
                }
                debug!(release = %release, task, "discarding blob of stale download");
                if let Err(e) = self.inner.parts.store.delete(&blob).await {
                    warn!(release = %release, error = %e, "failed to discard stale artifact");
                }
            }
            Err(e) => {
                if self.apply(|ledger| ledger.fail_download(&release, task)).is_applied() {
                    warn!(release = %release, error = %e, "download failed");
                    let kind = if e.is_network() {
                        NoticeKind::Network
                    } else {
                        NoticeKind::Storage
                    };
                    self.notify(kind, format!("Download of {} failed: {e}", release.version));
                } else {
                    debug!(release = %release, task, error = %e, "stale download failed");
                }
            }
        }
    }

    async fn fetch_and_store(&self, release: &ReleaseId, task: TaskId) -> ShelfResult<BlobRef> {
        let source = self.inner.parts.source.open(release).await?;
        let on_progress = |received: u64, total: u64| {
            self.apply(|ledger| ledger.record_progress(release, task, received, total));
        };
        self.inner.parts.store.write(release, source, &on_progress).await
    }

    fn run_cleanup(&self, cleanup: Vec<Cleanup>) {
        for action in cleanup {
            match action {
                Cleanup::DeleteArtifact { release, blob } => {
                    info!(release = %release, blob = %blob, "deleting artifact of withdrawn release");
                    let store = self.inner.parts.store.clone();
                    self.inner.tasks.spawn(async move {
                        if let Err(e) = store.delete(&blob).await {
                            warn!(release = %release, error = %e, "failed to delete orphaned artifact");
                        }
                    });
                }
                Cleanup::CancelDownload { release, handle } => {
                    info!(release = %release, task = handle.id(), "stopping download of withdrawn release");
                    handle.request_stop();
                }
            }
        }
    }

    async fn save_chosen_if_dirty(&self) {
        let _writer = self.inner.chosen_writer.lock().await;
        if !self.inner.chosen_dirty.swap(false, Ordering::SeqCst) {
            return;
        }
        let chosen = self.chosen();
        if let Err(e) = self.inner.parts.records.save_chosen(chosen.as_ref()).await {
            self.report_record_failure("chosen release", &e);
        }
    }

    fn report_record_failure(&self, record: &str, error: &ShelfError) {
        warn!(record, error = %error, "failed to persist record");
        self.notify(
            NoticeKind::Storage,
            format!("Failed to save {record}: {error}"),
        );
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager")
            .field("verify_limit", &self.inner.verify_limit)
            .finish_non_exhaustive()
    }
}
