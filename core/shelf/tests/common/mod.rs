//! In-memory collaborators shared by the core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio::sync::Semaphore;

use kshelf_core::{
    ArtifactSource, ArtifactStore, BlobRef, ByteSource, Collaborators, RecordStore,
    ReleaseId, ReleaseRegistry, ShelfError, ShelfResult, Status, VersionManager,
};

/// Payload served for every artifact.
pub const PAYLOAD: &[u8] = b"0123456789abcdefghij";

/// Releases served by the registry until changed.
pub struct ScriptedRegistry {
    releases: Mutex<Vec<ReleaseId>>,
    failure: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn new(releases: Vec<ReleaseId>) -> Self {
        Self {
            releases: Mutex::new(releases),
            failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_releases(&self, releases: Vec<ReleaseId>) {
        *self.releases.lock().unwrap() = releases;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseRegistry for ScriptedRegistry {
    async fn fetch_releases(&self) -> ShelfResult<Vec<ReleaseId>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(ShelfError::network(message));
        }
        Ok(self.releases.lock().unwrap().clone())
    }
}

/// Serves [`PAYLOAD`] in two chunks. With a gate installed the second
/// chunk waits for a permit, which keeps the download in flight.
#[derive(Default)]
pub struct ScriptedSource {
    gate: Mutex<Option<Arc<Semaphore>>>,
    fail_body: AtomicBool,
    fail_open: AtomicBool,
    opened: AtomicUsize,
}

impl ScriptedSource {
    /// Installs a closed gate and returns it.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_body(&self) {
        self.fail_body.store(true, Ordering::SeqCst);
    }

    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactSource for ScriptedSource {
    async fn open(&self, release: &ReleaseId) -> ShelfResult<ByteSource> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ShelfError::network(format!("not found: {}", release.version)));
        }
        let gate = self.gate.lock().unwrap().clone();
        let fail = self.fail_body.load(Ordering::SeqCst);
        let (head, tail) = PAYLOAD.split_at(PAYLOAD.len() / 2);

        let first = stream::once(async move { Ok(Bytes::from_static(head)) });
        let second = stream::once(async move {
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            if fail {
                Err(ShelfError::network("connection reset"))
            } else {
                Ok(Bytes::from_static(tail))
            }
        });
        Ok(ByteSource::new(
            Some(PAYLOAD.len() as u64),
            first.chain(second),
        ))
    }
}

/// Artifact and record store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<BlobRef, Vec<u8>>>,
    snapshot: Mutex<Option<Vec<ReleaseId>>>,
    chosen: Mutex<Option<Option<ReleaseId>>>,
    snapshot_writes: AtomicUsize,
    chosen_writes: AtomicUsize,
    exists_gate: Mutex<Option<Arc<Semaphore>>>,
    delete_gate: Mutex<Option<Arc<Semaphore>>>,
    in_flight_checks: AtomicUsize,
    max_in_flight_checks: AtomicUsize,
    extra_progress: AtomicUsize,
    after_write: Mutex<Option<WriteHook>>,
}

/// Runs once a write has stored its blob, before `write` returns.
pub type WriteHook = Box<dyn Fn(&ReleaseId) + Send + Sync>;

impl MemoryStore {
    pub fn key(release: &ReleaseId) -> BlobRef {
        BlobRef::new(format!("{}-{}.jar", release.version, release.timestamp))
    }

    pub fn put(&self, release: &ReleaseId) -> BlobRef {
        let blob = Self::key(release);
        self.blobs
            .lock()
            .unwrap()
            .insert(blob.clone(), PAYLOAD.to_vec());
        blob
    }

    pub fn contains(&self, release: &ReleaseId) -> bool {
        self.blobs.lock().unwrap().contains_key(&Self::key(release))
    }

    pub fn erase(&self, release: &ReleaseId) {
        self.blobs.lock().unwrap().remove(&Self::key(release));
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn set_snapshot(&self, releases: Vec<ReleaseId>) {
        *self.snapshot.lock().unwrap() = Some(releases);
    }

    pub fn stored_snapshot(&self) -> Option<Vec<ReleaseId>> {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn snapshot_writes(&self) -> usize {
        self.snapshot_writes.load(Ordering::SeqCst)
    }

    pub fn set_chosen(&self, chosen: Option<ReleaseId>) {
        *self.chosen.lock().unwrap() = Some(chosen);
    }

    /// `None` if never written, `Some(value)` otherwise.
    pub fn stored_chosen(&self) -> Option<Option<ReleaseId>> {
        self.chosen.lock().unwrap().clone()
    }

    pub fn chosen_writes(&self) -> usize {
        self.chosen_writes.load(Ordering::SeqCst)
    }

    pub fn hold_exists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.exists_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn hold_delete(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.delete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn payload(&self, release: &ReleaseId) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(&Self::key(release)).cloned()
    }

    pub fn checks_in_flight(&self) -> usize {
        self.in_flight_checks.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_checks(&self) -> usize {
        self.max_in_flight_checks.load(Ordering::SeqCst)
    }

    /// Makes every write report `count` progress updates before the first
    /// chunk, without yielding in between.
    pub fn flood_progress(&self, count: usize) {
        self.extra_progress.store(count, Ordering::SeqCst);
    }

    pub fn after_write(&self, hook: WriteHook) {
        *self.after_write.lock().unwrap() = Some(hook);
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    fn blob_ref(&self, release: &ReleaseId) -> BlobRef {
        Self::key(release)
    }

    async fn exists(&self, blob: &BlobRef) -> ShelfResult<bool> {
        let now = self.in_flight_checks.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_checks.fetch_max(now, Ordering::SeqCst);
        let gate = self.exists_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let present = self.blobs.lock().unwrap().contains_key(blob);
        self.in_flight_checks.fetch_sub(1, Ordering::SeqCst);
        Ok(present)
    }

    async fn write(
        &self,
        release: &ReleaseId,
        mut source: ByteSource,
        on_progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> ShelfResult<BlobRef> {
        let total = source.total.unwrap_or(0);
        for i in 0..self.extra_progress.load(Ordering::SeqCst) {
            on_progress(i as u64 % total.max(1), total);
        }
        let mut data = Vec::new();
        while let Some(chunk) = source.chunks.next().await {
            data.extend_from_slice(&chunk?);
            on_progress(data.len() as u64, total);
        }
        let blob = Self::key(release);
        self.blobs.lock().unwrap().insert(blob.clone(), data);
        if let Some(hook) = self.after_write.lock().unwrap().as_ref() {
            hook(release);
        }
        Ok(blob)
    }

    async fn delete(&self, blob: &BlobRef) -> ShelfResult<()> {
        let gate = self.delete_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        self.blobs.lock().unwrap().remove(blob);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_snapshot(&self) -> Option<Vec<ReleaseId>> {
        self.snapshot.lock().unwrap().clone()
    }

    async fn save_snapshot(&self, releases: &[ReleaseId]) -> ShelfResult<()> {
        self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        *self.snapshot.lock().unwrap() = Some(releases.to_vec());
        Ok(())
    }

    async fn load_chosen(&self) -> Option<ReleaseId> {
        self.chosen.lock().unwrap().clone().flatten()
    }

    async fn save_chosen(&self, chosen: Option<&ReleaseId>) -> ShelfResult<()> {
        self.chosen_writes.fetch_add(1, Ordering::SeqCst);
        *self.chosen.lock().unwrap() = Some(chosen.cloned());
        Ok(())
    }
}

/// A manager wired to in-memory collaborators.
pub struct Harness {
    pub manager: VersionManager,
    pub registry: Arc<ScriptedRegistry>,
    pub source: Arc<ScriptedSource>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(releases: Vec<ReleaseId>) -> Harness {
    let registry = Arc::new(ScriptedRegistry::new(releases));
    let source = Arc::new(ScriptedSource::default());
    let store = Arc::new(MemoryStore::default());
    let manager = VersionManager::new(
        Collaborators {
            registry: registry.clone(),
            source: source.clone(),
            store: store.clone(),
            records: store.clone(),
        },
        4,
    );
    Harness {
        manager,
        registry,
        source,
        store,
    }
}

pub fn release(version: &str, timestamp: i64) -> ReleaseId {
    ReleaseId::new(version, timestamp)
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Waits for `release` to reach a status matching `predicate`.
pub async fn settle(
    manager: &VersionManager,
    release: &ReleaseId,
    predicate: impl Fn(Option<Status>) -> bool,
) -> Option<Status> {
    tokio::time::timeout(Duration::from_secs(5), manager.wait_for(release, predicate))
        .await
        .expect("status did not settle in time")
}

pub fn is_downloading(status: Option<Status>) -> bool {
    matches!(status, Some(Status::Downloading { .. }))
}

pub fn is(expected: Status) -> impl Fn(Option<Status>) -> bool {
    move |status| status == Some(expected)
}
