use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use strata_cache::ArtifactKind;
use strata_core::{Fingerprint, UnitId};
use strata_metadata::UnitMetadata;
use strata_scheduler::CancellationToken;
use strata_vfs::FileHandle;

/// Everything a type checker needs to process one unit.
#[derive(Debug, Clone)]
pub struct CheckInput {
    pub metadata: Arc<UnitMetadata>,
    /// Handles of the unit's files, in the order of `metadata.files`.
    pub files: Vec<FileHandle>,
    /// Each resolved dependency with its unit key.
    pub deps: Vec<(UnitId, Fingerprint)>,
}

/// The serialized products of checking one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedUnit {
    pub id: UnitId,
    pub artifacts: BTreeMap<ArtifactKind, Vec<u8>>,
}

impl CheckedUnit {
    /// A result carrying no artifacts; every kind is served as empty.
    pub fn empty(id: UnitId) -> Self {
        Self {
            id,
            artifacts: BTreeMap::new(),
        }
    }
}

/// One serialized artifact returned by a snapshot query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub unit: UnitId,
    pub kind: ArtifactKind,
    pub bytes: Arc<[u8]>,
}

/// Type-checks a unit and serializes its derived artifacts.
///
/// The snapshot never inspects artifact bytes. A kind missing from
/// [`CheckedUnit::artifacts`] is served as empty.
#[async_trait]
pub trait TypeChecker: Send + Sync {
    async fn check(
        &self,
        unit: CheckInput,
        cancel: &CancellationToken,
    ) -> anyhow::Result<CheckedUnit>;
}
