//! The snapshot type and its reference-counted lifecycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::{DocumentUri, Fingerprint, UnitId, UnitPath};
use strata_memoize::{Promise, Store};
use strata_metadata::{compute_workspace_units, MetadataGraph};
use strata_persistent::{Map, Set};
use strata_scheduler::BackgroundScope;
use strata_vfs::FileMap;

use crate::error::{Error, LoadError, Result};
use crate::loader::LoadKey;
use crate::unit_handle::UnitHandle;
use crate::view::View;

/// Runs once when a snapshot is destroyed.
pub type DoneFn = Box<dyn FnOnce() + Send>;

/// Result of a tool run keyed by the manifest that scopes it.
pub(crate) type ToolPromise = Promise<Arc<[u8]>>;

/// The mutable part of a snapshot, guarded by its header lock.
///
/// Every field is either immutable once shared or a persistent structure, so
/// cloning a `State` is cheap and invisible to the snapshot it came from.
pub(crate) struct State {
    pub(crate) initialized: bool,
    pub(crate) init_error: Option<LoadError>,
    pub(crate) builtin: Option<DocumentUri>,
    pub(crate) meta: Arc<MetadataGraph>,
    pub(crate) files: FileMap,
    pub(crate) units: Map<UnitId, Arc<UnitHandle>>,
    pub(crate) full_analysis_keys: Map<UnitId, Fingerprint>,
    pub(crate) facty_analysis_keys: Map<UnitId, Fingerprint>,
    pub(crate) workspace_units: Arc<BTreeMap<UnitId, UnitPath>>,
    /// Units whose metadata was invalidated, with the paths to reload them by.
    pub(crate) should_load: Map<UnitId, Vec<UnitPath>>,
    /// Files for which a load produced no units.
    pub(crate) unloadable_files: Set<DocumentUri>,
    pub(crate) tool_results: Map<DocumentUri, Arc<ToolPromise>>,
    pub(crate) compiler_opt_details: BTreeSet<DocumentUri>,
}

impl State {
    pub(crate) fn empty() -> Self {
        Self {
            initialized: false,
            init_error: None,
            builtin: None,
            meta: MetadataGraph::new(),
            files: FileMap::new(),
            units: Map::new(),
            full_analysis_keys: Map::new(),
            facty_analysis_keys: Map::new(),
            workspace_units: Arc::new(BTreeMap::new()),
            should_load: Map::new(),
            unloadable_files: Set::new(),
            tool_results: Map::new(),
            compiler_opt_details: BTreeSet::new(),
        }
    }

    pub(crate) fn recompute_workspace_units(&mut self, view: &View) {
        let open = self.files.overlays().map(|fh| fh.uri().clone());
        let scope = view.workspace_scope(open);
        self.workspace_units = Arc::new(compute_workspace_units(&self.meta, &scope));
    }

    fn destroy(&mut self) {
        self.meta = MetadataGraph::new();
        self.files.destroy();
        self.units.destroy();
        self.full_analysis_keys.destroy();
        self.facty_analysis_keys.destroy();
        self.workspace_units = Arc::new(BTreeMap::new());
        self.should_load.destroy();
        self.unloadable_files.destroy();
        self.tool_results.destroy();
        self.compiler_opt_details.clear();
    }
}

/// An immutable, versioned view of the workspace.
///
/// Snapshots are reference counted explicitly through [`SnapshotRef`]
/// guards. When the last guard is dropped the snapshot cancels its
/// background work, releases its persistent structures, and runs its
/// completion callback. Using a snapshot after that is a bug.
pub struct Snapshot {
    sequence_id: u64,
    pub(crate) view: Arc<View>,
    pub(crate) background: BackgroundScope,
    pub(crate) loads: Store<LoadKey, Result<(), LoadError>>,
    /// Held for the whole initial load, including recording its outcome.
    pub(crate) initialization: tokio::sync::Mutex<()>,
    refcount: Mutex<usize>,
    done: Mutex<Option<DoneFn>>,
    pub(crate) state: Mutex<State>,
}

impl Snapshot {
    /// Creates a snapshot holding one reference, returned as its guard.
    pub(crate) fn create(
        view: Arc<View>,
        sequence_id: u64,
        state: State,
        done: Option<DoneFn>,
    ) -> SnapshotRef {
        let background = view.background.child();
        let snapshot = Arc::new(Snapshot {
            sequence_id,
            view,
            background,
            loads: Store::new(),
            initialization: tokio::sync::Mutex::new(()),
            refcount: Mutex::new(1),
            done: Mutex::new(done),
            state: Mutex::new(state),
        });
        SnapshotRef { snapshot }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Takes another reference to this snapshot.
    pub fn acquire(self: &Arc<Self>) -> Result<SnapshotRef> {
        let mut refcount = self.refcount.lock();
        if *refcount == 0 {
            strata_core::bug!("acquire of destroyed snapshot {}", self.sequence_id);
            return Err(Error::Destroyed {
                sequence_id: self.sequence_id,
            });
        }
        *refcount += 1;
        Ok(SnapshotRef {
            snapshot: Arc::clone(self),
        })
    }

    pub fn is_destroyed(&self) -> bool {
        *self.refcount.lock() == 0
    }

    fn release(&self) {
        {
            let mut refcount = self.refcount.lock();
            match *refcount {
                0 => {
                    strata_core::bug!("release of destroyed snapshot {}", self.sequence_id);
                    return;
                }
                1 => *refcount = 0,
                _ => {
                    *refcount -= 1;
                    return;
                }
            }
        }

        tracing::debug!(
            target = "strata.workspace",
            seq = self.sequence_id,
            "destroying snapshot"
        );
        self.background.cancel();
        self.state.lock().destroy();
        if let Some(done) = self.done.lock().take() {
            done();
        }
    }

    pub(crate) fn check_live(&self) -> Result<()> {
        if self.is_destroyed() {
            strata_core::bug!("query on destroyed snapshot {}", self.sequence_id);
            return Err(Error::Destroyed {
                sequence_id: self.sequence_id,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence_id", &self.sequence_id)
            .field("refcount", &*self.refcount.lock())
            .finish_non_exhaustive()
    }
}

/// A counted reference to a [`Snapshot`]. Dropping it releases the reference.
pub struct SnapshotRef {
    snapshot: Arc<Snapshot>,
}

impl SnapshotRef {
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }
}

impl Deref for SnapshotRef {
    type Target = Arc<Snapshot>;

    fn deref(&self) -> &Self::Target {
        &self.snapshot
    }
}

impl Clone for SnapshotRef {
    fn clone(&self) -> Self {
        *self.snapshot.refcount.lock() += 1;
        Self {
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

impl Drop for SnapshotRef {
    fn drop(&mut self) {
        self.snapshot.release();
    }
}

impl fmt::Debug for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.snapshot, f)
    }
}
