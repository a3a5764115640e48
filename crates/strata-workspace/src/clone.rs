//! Deriving a successor snapshot from a batch of file changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use strata_core::{in_dir, DocumentUri, UnitId, UnitPath};
use strata_metadata::{MetadataGraph, UnitMetadata};
use strata_persistent::Map;
use strata_vfs::{changed_on_disk, file_was_saved, FileAction, FileHandle, StateChange};

use crate::header::{metadata_changes, MetadataChange};
use crate::snapshot::{DoneFn, Snapshot, SnapshotRef, State, ToolPromise};
use crate::unit_handle::Validity;

impl Snapshot {
    /// Derives the successor of this snapshot after `change`.
    ///
    /// Returns the new snapshot (holding one reference) and whether anything
    /// observable changed such that diagnostics should be recomputed. State
    /// untouched by the change is shared with `self`.
    pub fn clone_with(
        self: &Arc<Self>,
        change: StateChange,
        done: Option<DoneFn>,
    ) -> (SnapshotRef, bool) {
        let _span = tracing::debug_span!(
            "snapshot.clone",
            from = self.sequence_id(),
            files = change.files.len()
        )
        .entered();

        let view = &self.view;
        let config = &view.config;
        let state = self.state.lock();

        let mut needs_diagnosis = !change.compiler_opt_details.is_empty();

        let mut compiler_opt_details: BTreeSet<DocumentUri> = state
            .compiler_opt_details
            .iter()
            .filter(|dir| !change.compiler_opt_details.contains_key(*dir))
            .cloned()
            .collect();
        compiler_opt_details.extend(
            change
                .compiler_opt_details
                .iter()
                .filter(|(_, want)| **want)
                .map(|(dir, _)| dir.clone()),
        );

        let mut reinit = false;
        for m in &change.modifications {
            let vendor_tree_changed = config.in_vendor(&m.uri)
                && matches!(m.action, FileAction::Create | FileAction::Delete);
            if vendor_tree_changed || config.is_vendor_manifest(&m.uri) {
                reinit = true;
                break;
            }
            if config.is_workspace_file(&m.uri) && (m.action == FileAction::Save || m.on_disk) {
                reinit = true;
                break;
            }
        }

        // Handles observed by the old snapshot. Deliberately not read here: a
        // file created on disk must look new to the checks below.
        let old_files: BTreeMap<&DocumentUri, &FileHandle> = change
            .files
            .keys()
            .filter_map(|uri| state.files.get(uri).map(|fh| (uri, fh)))
            .collect();

        for (uri, new) in &change.files {
            if config.is_manifest_file(uri)
                && changed_on_disk(old_files.get(uri).copied(), new)
            {
                reinit = true;
            }
        }

        let mut tool_results = state.tool_results.clone();
        for uri in change.files.keys() {
            if tool_results.delete(uri) {
                needs_diagnosis = true;
            }
        }

        let mut next = State {
            initialized: state.initialized && !reinit,
            init_error: state.init_error.clone(),
            builtin: state.builtin.clone(),
            meta: Arc::clone(&state.meta),
            files: state.files.clone_with(&change.files),
            units: state.units.clone(),
            full_analysis_keys: state.full_analysis_keys.clone(),
            facty_analysis_keys: state.facty_analysis_keys.clone(),
            workspace_units: Arc::clone(&state.workspace_units),
            should_load: state.should_load.clone(),
            unloadable_files: state.unloadable_files.clone(),
            tool_results,
            compiler_opt_details,
        };

        // Unit id -> whether its metadata is invalidated too.
        let mut direct_ids: BTreeMap<UnitId, bool> = BTreeMap::new();
        if reinit {
            needs_diagnosis = true;
            for unit in state.meta.units() {
                direct_ids.insert(unit.id.clone(), true);
            }
        }

        let mut any_import_deleted = false;
        let mut any_file_opened_or_closed = false;
        let mut any_unit_file_changed = false;
        let mut dir_identities = DirIdentities::default();

        for (uri, new) in &change.files {
            let old = old_files.get(uri).copied();
            let was_open = old.is_some_and(FileHandle::is_open);
            any_file_opened_or_closed |= was_open != new.is_open();
            any_unit_file_changed |= !old.is_some_and(FileHandle::exists) && new.exists();

            let change_kind = if config.is_source_file(uri) {
                metadata_changes(&view.headers, old, new)
            } else {
                MetadataChange::default()
            };
            if change_kind.invalidate {
                // Perhaps a reload will succeed now.
                next.unloadable_files.remove(uri);
                needs_diagnosis = true;
            }
            let invalidate = change_kind.invalidate || reinit;
            any_import_deleted |= change_kind.import_deleted;
            any_unit_file_changed |= change_kind.unit_file_changed;

            for id in invalidated_unit_ids(
                uri,
                &state.meta,
                change_kind.unit_file_changed,
                &mut dir_identities,
            ) {
                *direct_ids.entry(id).or_default() |= invalidate;
            }

            if invalidate || file_was_saved(old, new) {
                delete_most_relevant_tool_result(&mut next.tool_results, uri);
            }
        }

        // Removing an import may break a cycle reported as a unit error.
        if any_import_deleted {
            for unit in state.meta.units() {
                if !unit.errors.is_empty() {
                    direct_ids.insert(unit.id.clone(), true);
                }
            }
        }

        // A new file may provide a dependency that was missing.
        if any_unit_file_changed {
            for unit in state.meta.units() {
                if unit.has_unresolved_deps() {
                    direct_ids.insert(unit.id.clone(), true);
                }
            }
        }

        let mut to_invalidate: BTreeMap<UnitId, bool> = BTreeMap::new();
        for (id, invalidate_metadata) in &direct_ids {
            add_reverse_deps(&state.meta, &mut to_invalidate, id, *invalidate_metadata);
        }

        for (id, invalidate_metadata) in &to_invalidate {
            let Some(handle) = next.units.get(id).cloned() else {
                continue;
            };
            needs_diagnosis = true;
            next.full_analysis_keys.delete(id);
            next.facty_analysis_keys.delete(id);
            if *invalidate_metadata {
                next.units.delete(id);
            } else {
                // Local inputs changed for direct ids; only a dependency
                // changed for the rest. Both keep their metadata.
                let lowered = handle.with_validity(Validity::ValidMetadataOnly);
                next.units.set(id.clone(), Arc::new(lowered));
            }
        }

        let mut updates: BTreeMap<UnitId, Option<UnitMetadata>> = BTreeMap::new();
        for unit in state.meta.units() {
            if !to_invalidate.get(&unit.id).copied().unwrap_or(false) {
                continue;
            }
            if !unit.is_synthetic() {
                next.should_load.set(unit.id.clone(), reload_paths(unit));
            }
            needs_diagnosis = true;
            updates.insert(unit.id.clone(), None);
        }
        next.meta = state.meta.update(updates);

        if !Arc::ptr_eq(&next.meta, &state.meta) || any_file_opened_or_closed {
            needs_diagnosis = true;
            next.recompute_workspace_units(view);
        }

        tracing::debug!(
            target = "strata.workspace",
            seq = self.sequence_id() + 1,
            reinit,
            invalidated = to_invalidate.len(),
            needs_diagnosis,
            "snapshot cloned"
        );

        drop(state);
        let next = Snapshot::create(Arc::clone(view), self.sequence_id() + 1, next, done);
        (next, needs_diagnosis)
    }
}

/// Paths that must be reloaded to restore `unit`: its own path, plus the
/// unit under test for test variants.
fn reload_paths(unit: &UnitMetadata) -> Vec<UnitPath> {
    let mut paths = vec![unit.path.clone()];
    if let Some(for_test) = &unit.for_test {
        if for_test != &unit.path {
            paths.push(for_test.clone());
        }
    }
    paths
}

/// Adds `id` and its transitive importers to `out`.
///
/// A unit is revisited only when its metadata flag is raised, which bounds
/// the walk even on cyclic graphs.
fn add_reverse_deps(
    meta: &MetadataGraph,
    out: &mut BTreeMap<UnitId, bool>,
    id: &UnitId,
    invalidate_metadata: bool,
) {
    let current = out.get(id).copied();
    let next = current.unwrap_or(false) || invalidate_metadata;
    if current == Some(next) {
        return;
    }
    out.insert(id.clone(), next);
    for importer in meta.imported_by(id) {
        add_reverse_deps(meta, out, importer, invalidate_metadata);
    }
}

/// Units affected by a change to `uri`.
///
/// Known units containing the file always count. When the file is new to the
/// graph or may have moved between units, units with files in the same
/// directory are added as a best-effort guess. Directories that cannot be
/// inspected contribute no guesses.
fn invalidated_unit_ids(
    uri: &DocumentUri,
    meta: &MetadataGraph,
    unit_file_changed: bool,
    dirs: &mut DirIdentities,
) -> BTreeSet<UnitId> {
    let mut ids: BTreeSet<UnitId> = meta.ids_for_file(uri).iter().cloned().collect();
    if !unit_file_changed && !ids.is_empty() {
        return ids;
    }

    let dir = uri.dir_path();
    for (known, known_ids) in meta.files() {
        if dirs.same_dir(dir, known.dir_path()) {
            ids.extend(known_ids.iter().cloned());
        }
    }
    ids
}

/// Memoized directory identity lookups for one clone.
#[derive(Default)]
struct DirIdentities {
    stats: HashMap<String, Option<DirIdentity>>,
}

impl DirIdentities {
    fn identity(&mut self, dir: &str) -> Option<DirIdentity> {
        self.stats
            .entry(dir.to_owned())
            .or_insert_with(|| DirIdentity::of(Path::new(dir)))
            .clone()
    }

    /// Whether `a` and `b` denote the same directory. A directory that
    /// cannot be inspected matches nothing.
    fn same_dir(&mut self, a: &str, b: &str) -> bool {
        match (self.identity(a), self.identity(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DirIdentity {
    #[cfg(unix)]
    Inode { dev: u64, ino: u64 },
    #[cfg_attr(unix, allow(dead_code))]
    Canonical(std::path::PathBuf),
}

impl DirIdentity {
    #[cfg(unix)]
    fn of(path: &Path) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path).ok()?;
        Some(DirIdentity::Inode {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(path: &Path) -> Option<Self> {
        std::fs::canonicalize(path).ok().map(DirIdentity::Canonical)
    }
}

/// Drops the side-cache entry whose manifest most likely scopes `changed`:
/// the longest key whose directory contains it.
fn delete_most_relevant_tool_result(
    results: &mut Map<DocumentUri, Arc<ToolPromise>>,
    changed: &DocumentUri,
) {
    let most_relevant = results
        .keys()
        .filter(|manifest| in_dir(manifest.dir_path(), changed.path()))
        .max_by_key(|manifest| manifest.as_str().len())
        .cloned();
    if let Some(manifest) = most_relevant {
        results.delete(&manifest);
    }
}
