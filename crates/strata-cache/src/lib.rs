//! Content-addressable storage for derived artifacts.
//!
//! Entries are addressed by `(kind, fingerprint)`. A miss is never an error;
//! it is the cue to recompute and then populate. Byte encodings of the
//! individual artifact kinds belong to their producers.

mod disk;
mod entry;
mod error;
mod memory;

pub use disk::DiskArtifactCache;
pub use entry::ARTIFACT_CACHE_SCHEMA_VERSION;
pub use error::{CacheError, Result};
pub use memory::MemoryArtifactCache;

use serde::{Deserialize, Serialize};
use strata_core::Fingerprint;

/// The kinds of artifact a unit produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Xrefs,
    MethodSets,
    Tests,
    Diagnostics,
    ExportData,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Xrefs,
        ArtifactKind::MethodSets,
        ArtifactKind::Tests,
        ArtifactKind::Diagnostics,
        ArtifactKind::ExportData,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Xrefs => "xrefs",
            ArtifactKind::MethodSets => "methodsets",
            ArtifactKind::Tests => "tests",
            ArtifactKind::Diagnostics => "diagnostics",
            ArtifactKind::ExportData => "export",
        }
    }
}

/// A `(kind, key) -> bytes` store. Implementations must be safe for
/// concurrent use.
pub trait ArtifactCache: Send + Sync {
    fn get(&self, kind: ArtifactKind, key: &Fingerprint) -> Result<Option<Vec<u8>>>;

    fn set(&self, kind: ArtifactKind, key: &Fingerprint, bytes: &[u8]) -> Result<()>;
}
