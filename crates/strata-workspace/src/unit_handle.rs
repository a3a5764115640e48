use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_core::{Fingerprint, FingerprintBuilder, UnitId};
use strata_memoize::Promise;
use strata_metadata::UnitMetadata;
use strata_vfs::FileHandle;

use crate::check::{CheckInput, CheckedUnit};

/// How much of a unit handle's cached state can be reused.
///
/// Ordered from least to most valid. Invalidation only ever moves a handle
/// down this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Validity {
    /// Must be rebuilt from metadata up.
    Invalid,
    /// The unit's own inputs may have changed, or one of its dependencies did.
    /// Metadata is still correct; keys must be recomputed.
    ValidMetadataOnly,
    /// Local inputs and dependency keys are unchanged.
    FullyValid,
}

pub(crate) type CheckPromise = Promise<Arc<CheckedUnit>>;

/// Derived state of one unit in one snapshot.
///
/// Handles are immutable and shared between snapshots through `Arc`. A handle
/// below [`Validity::FullyValid`] is rebuilt before its keys are used.
pub struct UnitHandle {
    metadata: Arc<UnitMetadata>,
    validity: Validity,
    local_key: Fingerprint,
    key: Fingerprint,
    files: Vec<FileHandle>,
    deps: Vec<(UnitId, Fingerprint)>,
    /// The check computation for `key`, attached on first use.
    check: OnceLock<Arc<CheckPromise>>,
}

impl UnitHandle {
    /// Builds a fully valid handle from the unit's file handles (in the order
    /// of `metadata.files`) and the keys of its resolved dependencies.
    pub(crate) fn new(
        metadata: Arc<UnitMetadata>,
        files: &[FileHandle],
        deps: &[(UnitId, Fingerprint)],
    ) -> Self {
        let mut deps = deps.to_vec();
        deps.sort();
        let local_key = local_key(&metadata, files);
        let key = unit_key(local_key, &deps);
        Self {
            metadata,
            validity: Validity::FullyValid,
            local_key,
            key,
            files: files.to_vec(),
            deps,
            check: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &UnitId {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &Arc<UnitMetadata> {
        &self.metadata
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Hash of the unit's own inputs.
    pub fn local_key(&self) -> Fingerprint {
        self.local_key
    }

    /// Hash of the unit's transitive inputs. Only meaningful when fully valid.
    pub fn key(&self) -> Fingerprint {
        self.key
    }

    /// A copy of this handle whose validity is at most `validity`.
    pub fn with_validity(&self, validity: Validity) -> Self {
        let validity = self.validity.min(validity);
        let check = OnceLock::new();
        if validity == Validity::FullyValid {
            if let Some(promise) = self.check.get() {
                let _ = check.set(Arc::clone(promise));
            }
        }
        Self {
            metadata: Arc::clone(&self.metadata),
            validity,
            local_key: self.local_key,
            key: self.key,
            files: self.files.clone(),
            deps: self.deps.clone(),
            check,
        }
    }

    pub(crate) fn check_input(&self) -> CheckInput {
        CheckInput {
            metadata: Arc::clone(&self.metadata),
            files: self.files.clone(),
            deps: self.deps.clone(),
        }
    }

    pub(crate) fn check_promise(
        &self,
        make: impl FnOnce() -> Arc<CheckPromise>,
    ) -> Arc<CheckPromise> {
        Arc::clone(self.check.get_or_init(make))
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("id", self.id())
            .field("validity", &self.validity)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

fn local_key(metadata: &UnitMetadata, files: &[FileHandle]) -> Fingerprint {
    let mut builder = FingerprintBuilder::new();
    builder
        .field(metadata.id.as_str())
        .field(metadata.path.as_str())
        .field(&metadata.name)
        .field(metadata.for_test.as_ref().map_or("", |p| p.as_str()));
    for (path, dep) in &metadata.deps_by_path {
        builder
            .field(path.as_str())
            .field(dep.as_ref().map_or("", |id| id.as_str()));
    }
    for file in files {
        builder.field(file.uri().as_str()).fingerprint(&file.fingerprint());
    }
    builder.finish()
}

/// `deps` must be sorted.
fn unit_key(local_key: Fingerprint, deps: &[(UnitId, Fingerprint)]) -> Fingerprint {
    let mut builder = FingerprintBuilder::new();
    builder.fingerprint(&local_key);
    for (id, key) in deps {
        builder.field(id.as_str()).fingerprint(key);
    }
    builder.finish()
}
