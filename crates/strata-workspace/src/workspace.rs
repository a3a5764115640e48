use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use strata_cache::DiskArtifactCache;
use strata_config::{StrataConfig, WorkspaceConfig};
use strata_core::DocumentUri;
use strata_vfs::{FileAction, FileHandle, FileSource, Modification, OverlaySource, StateChange};

use crate::error::{Error, Result};
use crate::snapshot::{DoneFn, Snapshot, SnapshotRef, State};
use crate::view::{Collaborators, View};

/// Owns the current snapshot of one workspace and serializes changes to it.
///
/// Readers take a counted reference with [`Workspace::snapshot`] and keep
/// using it for as long as they like; a change publishes a successor without
/// disturbing them.
pub struct Workspace {
    view: Arc<View>,
    overlays: Arc<OverlaySource<Arc<dyn FileSource>>>,
    current: ArcSwapOption<SnapshotRef>,
    /// Serializes clone-and-publish.
    modify: Mutex<()>,
}

impl Workspace {
    /// Creates a workspace with an empty, uninitialized first snapshot.
    ///
    /// Editor buffers are layered over `collaborators.source`. Without an
    /// explicit artifact cache, `config.cache.dir` selects the on-disk cache.
    pub fn new(
        config: StrataConfig,
        roots: Vec<DocumentUri>,
        mut collaborators: Collaborators,
    ) -> Result<Self> {
        let StrataConfig {
            workspace, cache, ..
        } = config;
        if collaborators.artifacts.is_none() {
            if let Some(dir) = cache.dir {
                collaborators.artifacts = Some(Arc::new(DiskArtifactCache::new(dir)?));
            }
        }
        let overlays = Arc::new(OverlaySource::new(Arc::clone(&collaborators.source)));
        collaborators.source = Arc::clone(&overlays) as Arc<dyn FileSource>;

        let view = Arc::new(View::new(workspace, roots, collaborators));
        tracing::info!(target = "strata.workspace", view = ?view, "workspace created");
        let first = Snapshot::create(Arc::clone(&view), 0, State::empty(), None);
        Ok(Self {
            view,
            overlays,
            current: ArcSwapOption::from_pointee(first),
            modify: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.view.config
    }

    pub fn roots(&self) -> &[DocumentUri] {
        &self.view.roots
    }

    /// A counted reference to the current snapshot.
    pub fn snapshot(&self) -> Result<SnapshotRef> {
        let current = self.current.load_full().ok_or(Error::ShutDown)?;
        current.acquire()
    }

    /// Applies editor and file-system events, then publishes the resulting
    /// snapshot.
    ///
    /// Returns the new snapshot and whether diagnostics should be
    /// recomputed.
    pub fn did_modify_files(
        &self,
        modifications: Vec<Modification>,
    ) -> Result<(SnapshotRef, bool)> {
        let _modify = self.modify.lock();
        let mut change = StateChange::new();
        for modification in modifications {
            let uri = &modification.uri;
            if !modification.on_disk {
                self.apply_to_overlay(&modification);
            }
            let handle = self
                .overlays
                .read_file(uri)
                .unwrap_or_else(|err| FileHandle::failed(uri.clone(), err));
            change.files.insert(uri.clone(), handle);
            change.modifications.push(modification);
        }
        self.publish(change, None)
    }

    fn apply_to_overlay(&self, modification: &Modification) {
        let uri = &modification.uri;
        match modification.action {
            FileAction::Open => {
                let text = modification.text.clone().unwrap_or_default();
                self.overlays.open(uri.clone(), text, modification.version);
            }
            FileAction::Change => {
                let applied = modification.text.as_deref().is_some_and(|text| {
                    self.overlays.change(uri, text, modification.version)
                });
                if !applied {
                    tracing::warn!(
                        target = "strata.workspace",
                        %uri,
                        "ignoring change to a file that is not open"
                    );
                }
            }
            FileAction::Save => {
                self.overlays.save(uri);
            }
            FileAction::Close => {
                self.overlays.close(uri);
            }
            FileAction::Create | FileAction::Delete => {}
        }
    }

    /// Publishes the successor of the current snapshot after `change`.
    ///
    /// `done` runs once the new snapshot is destroyed.
    pub fn apply_change(
        &self,
        change: StateChange,
        done: Option<DoneFn>,
    ) -> Result<(SnapshotRef, bool)> {
        let _modify = self.modify.lock();
        self.publish(change, done)
    }

    fn publish(&self, change: StateChange, done: Option<DoneFn>) -> Result<(SnapshotRef, bool)> {
        let current = self.current.load_full().ok_or(Error::ShutDown)?;
        let (next, needs_diagnosis) = current.clone_with(change, done);
        let returned = next.clone();
        self.current.store(Some(Arc::new(next)));
        tracing::debug!(
            target = "strata.workspace",
            seq = returned.sequence_id(),
            needs_diagnosis,
            "snapshot published"
        );
        Ok((returned, needs_diagnosis))
    }

    /// Cancels all background work and releases the current snapshot.
    /// Snapshots still referenced elsewhere stay usable but see cancelled
    /// background scopes.
    pub fn shutdown(&self) {
        let _modify = self.modify.lock();
        self.view.background.cancel();
        self.current.store(None);
        tracing::info!(target = "strata.workspace", "workspace shut down");
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.view.background.cancel();
    }
}
