//! Versioned workspace snapshots with precise invalidation.
//!
//! A [`Workspace`] publishes a sequence of immutable [`Snapshot`]s. Each file
//! change batch derives a successor that shares everything the change cannot
//! have affected with its predecessor: unchanged file handles, unit
//! metadata, and the derived per-unit state of units outside the
//! invalidation closure. Metadata is loaded lazily through the [`Loader`]
//! collaborator and type-checking artifacts are produced by the
//! [`TypeChecker`] collaborator, memoized by content key and persisted in an
//! artifact cache.

mod check;
mod clone;
mod error;
mod header;
mod load;
mod loader;
mod producers;
mod queries;
mod request_memo;
mod snapshot;
mod unit_handle;
mod view;
mod workspace;

pub use check::{Artifact, CheckInput, CheckedUnit, TypeChecker};
pub use error::{Error, LoadError, Result};
pub use header::{
    metadata_changes, FileHeader, HeaderCache, HeaderParser, MetadataChange, SimpleHeaderParser,
};
pub use loader::{LoadKey, LoadResult, LoadScope, Loader};
pub use producers::{ProducerRegistry, ProducerRequest};
pub use request_memo::RequestMemo;
pub use snapshot::{DoneFn, Snapshot, SnapshotRef};
pub use unit_handle::{UnitHandle, Validity};
pub use view::Collaborators;
pub use workspace::Workspace;

pub use strata_cache::ArtifactKind;
pub use strata_scheduler::CancellationToken;
