//! Network-facing collaborator traits.
//!
//! [`ReleaseRegistry`] lists what has been published, [`ArtifactSource`]
//! opens the bytes of one release. The Maven Central implementation of both
//! lives in [`crate::maven`]; tests substitute in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::errors::ShelfResult;
use crate::release::ReleaseId;

/// Remote index of published releases.
#[async_trait]
pub trait ReleaseRegistry: Send + Sync {
    /// Fetches every currently published release.
    ///
    /// # Errors
    ///
    /// Returns [`ShelfError::Network`](crate::ShelfError::Network) on
    /// transport or parse failure.
    async fn fetch_releases(&self) -> ShelfResult<Vec<ReleaseId>>;
}

/// Opens a byte stream for one release's artifact.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// # Errors
    ///
    /// Returns a network error if the artifact cannot be requested.
    async fn open(&self, release: &ReleaseId) -> ShelfResult<ByteSource>;
}

/// Chunked artifact body with an optional total length.
pub struct ByteSource {
    /// Length in bytes, when the server reported one.
    pub total: Option<u64>,
    /// The body; an `Err` item aborts the write.
    pub chunks: BoxStream<'static, ShelfResult<Bytes>>,
}

impl ByteSource {
    #[must_use]
    pub fn new(
        total: Option<u64>,
        chunks: impl Stream<Item = ShelfResult<Bytes>> + Send + 'static,
    ) -> Self {
        Self {
            total,
            chunks: chunks.boxed(),
        }
    }

    /// Single-chunk source with a known length.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let total = u64::try_from(data.len()).ok();
        Self::new(total, stream::iter([Ok(data)]))
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}
