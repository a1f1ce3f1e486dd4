#![warn(clippy::pedantic)]

//! # kshelf core
//!
//! State management for a local shelf of Kotlin compiler releases: which
//! releases exist upstream, which are downloaded, which downloads are in
//! flight, and which release is the chosen (active) one.
//!
//! ## Module Structure
//!
//! - [`release`] - Release identifiers and blob references
//! - [`state`] - Per-release state, status projection and task handles
//! - [`machine`] - The ledger and its guarded transitions
//! - [`reconcile`] - Merging a fetched release list into local state
//! - [`chosen`] - Chosen-release invariant
//! - [`manager`] - The live engine driving tasks and publishing events
//! - [`events`] - Events and display rows for front ends
//! - [`registry`] - Registry and artifact source traits
//! - [`store`] - Artifact and record storage traits, filesystem store
//! - [`maven`] - Maven Central registry and artifact source
//! - [`config`] - Layered configuration
//! - [`errors`] - Error type

pub mod chosen;
pub mod config;
pub mod errors;
pub mod events;
pub mod machine;
pub mod manager;
pub mod maven;
pub mod reconcile;
pub mod registry;
pub mod release;
pub mod state;
pub mod store;

pub use config::ShelfConfig;
pub use errors::{ShelfError, ShelfResult};
pub use events::{Notice, NoticeKind, ReleaseView, ShelfEvent};
pub use machine::Transition;
pub use manager::{Collaborators, VersionManager};
pub use registry::{ArtifactSource, ByteSource, ReleaseRegistry};
pub use release::{BlobRef, ReleaseId};
pub use state::{Status, TaskHandle, VersionState};
pub use store::{ArtifactStore, FsStore, RecordStore};
