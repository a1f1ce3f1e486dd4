//! Local storage: artifacts and sidecar records.
//!
//! [`ArtifactStore`] is a blob store keyed by release; [`RecordStore`]
//! persists the last known release list and the chosen release.
//! [`FsStore`] implements both over the kshelf home directory.
//!
//! ## Writes
//!
//! Artifacts are streamed into a uniquely named `.part` file next to the
//! destination and renamed into place once complete. If the write future is
//! dropped (the download was cancelled) the partial file is removed, so the
//! compilers directory never holds a truncated jar under its final name.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::ShelfConfig;
use crate::errors::{ShelfError, ShelfResult};
use crate::registry::ByteSource;
use crate::release::{BlobRef, ReleaseId};

/// Minimum interval between progress callback invocations.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Progress callback: `(received, total)`; `total` is 0 when unknown.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Blob storage for downloaded artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Key under which `release` is stored.
    fn blob_ref(&self, release: &ReleaseId) -> BlobRef;

    /// # Errors
    ///
    /// Returns an I/O error if existence cannot be determined.
    async fn exists(&self, blob: &BlobRef) -> ShelfResult<bool>;

    /// Streams `source` into the store and returns the blob it now lives at.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the blob cannot be written and a network error
    /// if the source stream fails.
    async fn write(
        &self,
        release: &ReleaseId,
        source: ByteSource,
        on_progress: ProgressFn<'_>,
    ) -> ShelfResult<BlobRef>;

    /// Deletes a blob. Deleting a missing blob succeeds.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the blob exists but cannot be removed.
    async fn delete(&self, blob: &BlobRef) -> ShelfResult<()>;

    /// Returns the blob for `release` if it is present.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`exists`](Self::exists).
    async fn locate(&self, release: &ReleaseId) -> ShelfResult<Option<BlobRef>> {
        let blob = self.blob_ref(release);
        Ok(self.exists(&blob).await?.then_some(blob))
    }
}

/// Persistence for the release snapshot and the chosen release.
///
/// Loads never fail: a missing or unreadable record reads as `None`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load_snapshot(&self) -> Option<Vec<ReleaseId>>;

    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    async fn save_snapshot(&self, releases: &[ReleaseId]) -> ShelfResult<()>;

    async fn load_chosen(&self) -> Option<ReleaseId>;

    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    async fn save_chosen(&self, chosen: Option<&ReleaseId>) -> ShelfResult<()>;
}

/// Filesystem-backed [`ArtifactStore`] and [`RecordStore`].
#[derive(Debug, Clone)]
pub struct FsStore {
    compilers: PathBuf,
    snapshot: PathBuf,
    chosen: PathBuf,
}

impl FsStore {
    #[must_use]
    pub fn new(config: &ShelfConfig) -> Self {
        Self {
            compilers: config.compilers_dir(),
            snapshot: config.snapshot_path(),
            chosen: config.chosen_path(),
        }
    }

    /// Full path of a stored artifact.
    #[must_use]
    pub fn artifact_path(&self, blob: &BlobRef) -> PathBuf {
        self.compilers.join(blob.as_str())
    }

    async fn write_record(&self, path: &Path, content: Vec<u8>) -> ShelfResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ShelfError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        let temp = PartialFile::new(unique_temp_path(path));
        tokio::fs::write(temp.path(), content)
            .await
            .map_err(|e| ShelfError::io(format!("failed to write {}", temp.path().display()), e))?;
        tokio::fs::rename(temp.path(), path)
            .await
            .map_err(|e| ShelfError::io(format!("failed to replace {}", path.display()), e))?;
        temp.disarm();
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    fn blob_ref(&self, release: &ReleaseId) -> BlobRef {
        BlobRef::new(format!(
            "{}-{}.jar",
            sanitize(&release.version),
            release.timestamp
        ))
    }

    async fn exists(&self, blob: &BlobRef) -> ShelfResult<bool> {
        let path = self.artifact_path(blob);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ShelfError::io(format!("failed to stat {}", path.display()), e)),
        }
    }

    async fn write(
        &self,
        release: &ReleaseId,
        mut source: ByteSource,
        on_progress: ProgressFn<'_>,
    ) -> ShelfResult<BlobRef> {
        let blob = self.blob_ref(release);
        let dest = self.artifact_path(&blob);

        tokio::fs::create_dir_all(&self.compilers).await.map_err(|e| {
            ShelfError::io(
                format!("failed to create directory {}", self.compilers.display()),
                e,
            )
        })?;

        let temp = PartialFile::new(unique_temp_path(&dest));
        let mut file = tokio::fs::File::create(temp.path()).await.map_err(|e| {
            ShelfError::io(format!("failed to create {}", temp.path().display()), e)
        })?;

        let total = source.total.unwrap_or(0);
        let mut received: u64 = 0;
        let mut last_update = Instant::now();
        on_progress(received, total);

        while let Some(chunk) = source.chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| {
                ShelfError::io(format!("failed to write {}", temp.path().display()), e)
            })?;
            received += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_update) >= PROGRESS_INTERVAL {
                on_progress(received, total);
                last_update = now;
            }
        }

        file.flush()
            .await
            .map_err(|e| ShelfError::io(format!("failed to flush {}", temp.path().display()), e))?;
        drop(file);
        on_progress(received, total);

        tokio::fs::rename(temp.path(), &dest).await.map_err(|e| {
            ShelfError::io(
                format!(
                    "failed to rename {} to {}",
                    temp.path().display(),
                    dest.display()
                ),
                e,
            )
        })?;
        temp.disarm();
        debug!(blob = %blob, bytes = received, "artifact stored");
        Ok(blob)
    }

    async fn delete(&self, blob: &BlobRef) -> ShelfResult<()> {
        let path = self.artifact_path(blob);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ShelfError::io(format!("failed to delete {}", path.display()), e)),
        }
    }
}

#[async_trait]
impl RecordStore for FsStore {
    async fn load_snapshot(&self) -> Option<Vec<ReleaseId>> {
        read_record(&self.snapshot).await
    }

    async fn save_snapshot(&self, releases: &[ReleaseId]) -> ShelfResult<()> {
        let content = serde_json::to_vec_pretty(releases)
            .map_err(|e| ShelfError::record(format!("failed to serialize snapshot: {e}")))?;
        self.write_record(&self.snapshot, content).await
    }

    async fn load_chosen(&self) -> Option<ReleaseId> {
        read_record::<Option<ReleaseId>>(&self.chosen)
            .await
            .flatten()
    }

    async fn save_chosen(&self, chosen: Option<&ReleaseId>) -> ShelfResult<()> {
        let content = serde_json::to_vec(&chosen)
            .map_err(|e| ShelfError::record(format!("failed to serialize chosen release: {e}")))?;
        self.write_record(&self.chosen, content).await
    }
}

/// Reads and parses a JSON record; missing or corrupt records read as `None`.
async fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read record");
            return None;
        }
    };
    match serde_json::from_slice(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparsable record");
            None
        }
    }
}

/// Replaces characters that are unsafe in file names.
fn sanitize(version: &str) -> String {
    version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unique_temp_path(dest: &Path) -> PathBuf {
    let suffix: u64 = rand::rng().random();
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.{suffix:016x}.part"))
}

/// Temporary file that is removed on drop unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
