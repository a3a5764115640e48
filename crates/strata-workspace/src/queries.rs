//! Read-only queries over a snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use strata_cache::ArtifactKind;
use strata_core::{in_dir, DocumentUri, Fingerprint, FingerprintBuilder, UnitId, UnitPath};
use strata_memoize::{Promise, PromiseError};
use strata_metadata::{MetadataGraph, UnitMetadata};
use strata_scheduler::{for_each_bounded, run_until_cancelled, CancellationToken, Cancelled};
use strata_vfs::FileHandle;
use tracing::Instrument;

use crate::check::Artifact;
use crate::error::{Error, LoadError, Result};
use crate::snapshot::Snapshot;
use crate::unit_handle::{CheckPromise, UnitHandle, Validity};

impl Snapshot {
    /// The handle for `uri`, reading and caching it on first access.
    pub fn read_file(&self, uri: &DocumentUri) -> Result<FileHandle> {
        self.check_live()?;
        if let Some(fh) = self.state.lock().files.get(uri) {
            return Ok(fh.clone());
        }
        let fh = self.view.source.read_file(uri)?;
        let mut state = self.state.lock();
        if let Some(existing) = state.files.get(uri) {
            return Ok(existing.clone());
        }
        state.files.set(uri.clone(), fh.clone());
        Ok(fh)
    }

    /// The handle for `uri` if this snapshot has already observed it.
    pub fn find_file(&self, uri: &DocumentUri) -> Option<FileHandle> {
        self.state.lock().files.get(uri).cloned()
    }

    pub fn is_open(&self, uri: &DocumentUri) -> bool {
        self.state
            .lock()
            .files
            .get(uri)
            .is_some_and(FileHandle::is_open)
    }

    /// Reads every file in `uris` not yet observed, with bounded concurrency.
    ///
    /// Read failures are recorded as failed handles rather than returned.
    pub async fn preload_files(
        &self,
        uris: Vec<DocumentUri>,
        token: &CancellationToken,
    ) -> Result<()> {
        let missing: Vec<DocumentUri> = {
            let state = self.state.lock();
            let mut seen = HashSet::new();
            uris.into_iter()
                .filter(|uri| state.files.get(uri).is_none() && seen.insert(uri.clone()))
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        let limit = self.view.config.preload_concurrency;
        let source = Arc::clone(&self.view.source);
        let reads = for_each_bounded(missing, limit, |uri| {
            let source = Arc::clone(&source);
            async move {
                tokio::task::spawn_blocking(move || match source.read_file(&uri) {
                    Ok(fh) => fh,
                    Err(err) => FileHandle::failed(uri, err),
                })
                .await
            }
        });
        let handles = run_until_cancelled(token, reads).await?;

        let mut state = self.state.lock();
        for handle in handles {
            match handle {
                Ok(fh) => {
                    if state.files.get(fh.uri()).is_none() {
                        state.files.set(fh.uri().clone(), fh);
                    }
                }
                Err(err) => {
                    tracing::debug!(target = "strata.workspace", error = %err, "preload task failed");
                }
            }
        }
        Ok(())
    }

    pub fn metadata(&self, id: &UnitId) -> Option<Arc<UnitMetadata>> {
        self.state.lock().meta.unit(id).cloned()
    }

    /// The current graph, without waiting for pending loads.
    pub fn metadata_graph(&self) -> Arc<MetadataGraph> {
        Arc::clone(&self.state.lock().meta)
    }

    /// The graph after initialization and pending reloads.
    pub async fn load_metadata_graph(
        self: &Arc<Self>,
        token: &CancellationToken,
    ) -> Result<Arc<MetadataGraph>> {
        self.await_loaded(token).await?;
        Ok(self.metadata_graph())
    }

    pub async fn all_metadata(
        self: &Arc<Self>,
        token: &CancellationToken,
    ) -> Result<Vec<Arc<UnitMetadata>>> {
        let graph = self.load_metadata_graph(token).await?;
        Ok(graph.units().cloned().collect())
    }

    pub async fn workspace_metadata(
        self: &Arc<Self>,
        token: &CancellationToken,
    ) -> Result<Vec<Arc<UnitMetadata>>> {
        self.await_loaded(token).await?;
        let state = self.state.lock();
        Ok(state
            .workspace_units
            .keys()
            .filter_map(|id| state.meta.unit(id).cloned())
            .collect())
    }

    /// Top-level workspace units with the path each is loaded by.
    pub fn workspace_units(&self) -> Arc<BTreeMap<UnitId, UnitPath>> {
        Arc::clone(&self.state.lock().workspace_units)
    }

    /// Units whose metadata is invalidated and waiting for a reload.
    pub fn pending_reloads(&self) -> Vec<UnitId> {
        self.state.lock().should_load.keys().cloned().collect()
    }

    pub fn is_workspace_unit(&self, id: &UnitId) -> bool {
        self.state.lock().workspace_units.contains_key(id)
    }

    pub async fn reverse_dependencies(
        self: &Arc<Self>,
        id: &UnitId,
        transitive: bool,
        token: &CancellationToken,
    ) -> Result<BTreeMap<UnitId, Arc<UnitMetadata>>> {
        let graph = self.load_metadata_graph(token).await?;
        Ok(graph.reverse_dependencies(id, transitive))
    }

    /// Observed files at any depth beneath `dir`. Empty when no observed file
    /// lies beneath it.
    pub fn files_in_dir(&self, dir: &DocumentUri) -> Vec<FileHandle> {
        let state = self.state.lock();
        let dir = dir.path();
        if !state.files.contains_dir(dir) {
            return Vec::new();
        }
        state
            .files
            .all()
            .filter(|(uri, _)| uri.path() != dir && in_dir(dir, uri.path()))
            .map(|(_, fh)| fh.clone())
            .collect()
    }

    /// Every ancestor directory of an observed file.
    pub fn all_directories(&self) -> Vec<DocumentUri> {
        self.state
            .lock()
            .files
            .all_directories()
            .map(DocumentUri::from_path)
            .collect()
    }

    /// Validity of the cached handle for `id`, if one exists.
    pub fn unit_validity(&self, id: &UnitId) -> Option<Validity> {
        self.state.lock().units.get(id).map(|h| h.validity())
    }

    /// The cached handle for `id`, without rebuilding it.
    pub fn cached_unit_handle(&self, id: &UnitId) -> Option<Arc<UnitHandle>> {
        self.state.lock().units.get(id).cloned()
    }

    pub fn unit_handle(&self, id: &UnitId) -> Result<Arc<UnitHandle>> {
        let mut handles = self.unit_handles(std::slice::from_ref(id))?;
        handles.pop().ok_or_else(|| Error::UnknownUnit(id.clone()))
    }

    /// Fully valid handles for `ids`, building any missing or downgraded
    /// ones (and those of their dependencies) first.
    pub fn unit_handles(&self, ids: &[UnitId]) -> Result<Vec<Arc<UnitHandle>>> {
        self.check_live()?;
        let (meta, existing) = {
            let state = self.state.lock();
            (Arc::clone(&state.meta), state.units.clone())
        };

        let mut builder = HandleBuilder {
            snapshot: self,
            meta: &meta,
            existing: &existing,
            built: HashMap::new(),
            visiting: HashSet::new(),
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match builder.build(id)? {
                Some(handle) => out.push(handle),
                None => return Err(Error::UnknownUnit(id.clone())),
            }
        }
        let built = builder.built;

        let mut state = self.state.lock();
        for (id, handle) in built {
            let current = state.units.get(&id);
            let keep = current.is_some_and(|h| {
                h.validity() == Validity::FullyValid || Arc::ptr_eq(h, &handle)
            });
            if !keep && state.meta.contains(&id) {
                state.units.set(id, handle);
            }
        }
        Ok(out)
    }

    /// Artifacts of `kind` for each unit in `ids`, in order.
    ///
    /// Served from the artifact cache when possible; otherwise the units are
    /// checked, and every artifact the check produced is written back.
    pub async fn artifacts(
        self: &Arc<Self>,
        kind: ArtifactKind,
        ids: &[UnitId],
        token: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        let span = tracing::debug_span!(
            "snapshot.artifacts",
            seq = self.sequence_id(),
            kind = kind.as_str(),
            units = ids.len()
        );
        async move {
            let handles = self.unit_handles(ids)?;
            try_join_all(handles.into_iter().map(|h| self.artifact(kind, h, token))).await
        }
        .instrument(span)
        .await
    }

    pub async fn unit_diagnostics(
        self: &Arc<Self>,
        ids: &[UnitId],
        token: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.artifacts(ArtifactKind::Diagnostics, ids, token).await
    }

    pub async fn references(
        self: &Arc<Self>,
        ids: &[UnitId],
        token: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.artifacts(ArtifactKind::Xrefs, ids, token).await
    }

    pub async fn method_sets(
        self: &Arc<Self>,
        ids: &[UnitId],
        token: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.artifacts(ArtifactKind::MethodSets, ids, token).await
    }

    pub async fn tests(
        self: &Arc<Self>,
        ids: &[UnitId],
        token: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.artifacts(ArtifactKind::Tests, ids, token).await
    }

    async fn artifact(
        &self,
        kind: ArtifactKind,
        handle: Arc<UnitHandle>,
        token: &CancellationToken,
    ) -> Result<Artifact> {
        let key = handle.key();
        match self.view.artifacts.get(kind, &key) {
            Ok(Some(bytes)) => {
                return Ok(Artifact {
                    unit: handle.id().clone(),
                    kind,
                    bytes: bytes.into(),
                });
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(
                target = "strata.workspace",
                unit = %handle.id(),
                kind = kind.as_str(),
                error = %err,
                "artifact cache read failed"
            ),
        }

        let promise = handle.check_promise(|| self.check_promise(&handle));
        let checked = match promise.get(token).await {
            Ok(checked) => checked,
            Err(PromiseError::Cancelled) => return Err(Error::Cancelled),
            Err(PromiseError::Failed(err)) => return Err(Error::Check(err)),
        };
        let bytes = checked.artifacts.get(&kind).cloned().unwrap_or_default();
        Ok(Artifact {
            unit: handle.id().clone(),
            kind,
            bytes: bytes.into(),
        })
    }

    /// The shared check computation for `handle`'s key.
    ///
    /// Runs under the workspace's background scope, not this snapshot's: the
    /// result is shared by every snapshot with the same key.
    fn check_promise(&self, handle: &UnitHandle) -> Arc<CheckPromise> {
        let key = handle.key();
        let input = handle.check_input();
        let checker = Arc::clone(&self.view.checker);
        let cache = Arc::clone(&self.view.artifacts);
        let root = self.view.background.token().clone();
        self.view.checks.promise(key, move |cancel| {
            let input = input.clone();
            let checker = Arc::clone(&checker);
            let cache = Arc::clone(&cache);
            let root = root.clone();
            async move {
                let unit = input.metadata.id.clone();
                let checked = match run_until_cancelled(&root, checker.check(input, &cancel)).await
                {
                    Ok(Ok(checked)) => checked,
                    Ok(Err(_)) if cancel.is_cancelled() => return Err(PromiseError::Cancelled),
                    Ok(Err(err)) => return Err(PromiseError::from(err)),
                    Err(Cancelled) => return Err(PromiseError::Cancelled),
                };
                for (kind, bytes) in &checked.artifacts {
                    if let Err(err) = cache.set(*kind, &key, bytes) {
                        tracing::warn!(
                            target = "strata.workspace",
                            %unit,
                            kind = kind.as_str(),
                            error = %err,
                            "failed to store artifact"
                        );
                    }
                }
                Ok(Arc::new(checked))
            }
        })
    }

    /// An opaque key identifying the analysis inputs of `id`.
    ///
    /// `facts_only` selects the key for fact-producing analyses, which is
    /// stable across edits that change only non-exported results.
    pub fn analysis_key(&self, id: &UnitId, facts_only: bool) -> Result<Fingerprint> {
        {
            let state = self.state.lock();
            let keys = if facts_only {
                &state.facty_analysis_keys
            } else {
                &state.full_analysis_keys
            };
            if let Some(key) = keys.get(id) {
                return Ok(*key);
            }
        }

        let handle = self.unit_handle(id)?;
        let key = FingerprintBuilder::new()
            .field(if facts_only { "facts" } else { "full" })
            .fingerprint(&handle.key())
            .finish();
        let mut state = self.state.lock();
        let keys = if facts_only {
            &mut state.facty_analysis_keys
        } else {
            &mut state.full_analysis_keys
        };
        keys.set(id.clone(), key);
        Ok(key)
    }

    /// Runs (or reuses) a tool invocation scoped by `manifest`.
    ///
    /// The result is kept until a file under the manifest's directory is
    /// saved, written on disk, or edited in a way that affects metadata.
    /// Unsaved body edits keep it. `run` must not capture this snapshot.
    pub async fn tool_result<F, Fut>(
        &self,
        manifest: &DocumentUri,
        token: &CancellationToken,
        run: F,
    ) -> Result<Arc<[u8]>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
    {
        self.check_live()?;
        let promise = {
            let mut state = self.state.lock();
            match state.tool_results.get(manifest) {
                Some(promise) => Arc::clone(promise),
                None => {
                    let run = Arc::new(run);
                    let promise = Promise::new(format!("tool {manifest}"), move |cancel| {
                        let run = Arc::clone(&run);
                        async move {
                            let bytes = run(cancel).await?;
                            Ok::<_, PromiseError>(Arc::<[u8]>::from(bytes))
                        }
                    });
                    state.tool_results.set(manifest.clone(), Arc::clone(&promise));
                    promise
                }
            }
        };
        match promise.get(token).await {
            Ok(bytes) => Ok(bytes),
            Err(PromiseError::Cancelled) => Err(Error::Cancelled),
            Err(PromiseError::Failed(err)) => Err(Error::Tool(err)),
        }
    }

    /// Open source files that belong to no real unit.
    pub async fn orphaned_files(
        self: &Arc<Self>,
        token: &CancellationToken,
    ) -> Result<Vec<DocumentUri>> {
        self.await_loaded(token).await?;
        let open: Vec<DocumentUri> = {
            let state = self.state.lock();
            state
                .files
                .overlays()
                .map(|fh| fh.uri().clone())
                .filter(|uri| self.view.config.is_source_file(uri))
                .filter(|uri| state.builtin.as_ref() != Some(uri))
                .collect()
        };
        let mut orphaned = Vec::new();
        for uri in open {
            let units = self.metadata_for_file(&uri, true, token).await?;
            if units.iter().all(|unit| unit.is_synthetic()) {
                orphaned.push(uri);
            }
        }
        Ok(orphaned)
    }

    /// The error of the initial workspace load, if it failed.
    pub fn initialization_error(&self) -> Option<LoadError> {
        self.state.lock().init_error.clone()
    }

    pub fn is_builtin(&self, uri: &DocumentUri) -> bool {
        self.state.lock().builtin.as_ref() == Some(uri)
    }

    pub fn builtin_file(&self) -> Result<FileHandle> {
        let builtin = self.state.lock().builtin.clone();
        match builtin {
            Some(uri) => self.read_file(&uri),
            None => Err(Error::NoBuiltin),
        }
    }

    pub fn want_compiler_opt_details(&self, dir: &DocumentUri) -> bool {
        self.state.lock().compiler_opt_details.contains(dir)
    }
}

/// Post-order construction of unit handles for one query.
struct HandleBuilder<'a> {
    snapshot: &'a Snapshot,
    meta: &'a MetadataGraph,
    existing: &'a strata_persistent::Map<UnitId, Arc<UnitHandle>>,
    built: HashMap<UnitId, Arc<UnitHandle>>,
    visiting: HashSet<UnitId>,
}

impl HandleBuilder<'_> {
    /// Returns `None` for units on the current path (an import cycle).
    fn build(&mut self, id: &UnitId) -> Result<Option<Arc<UnitHandle>>> {
        if let Some(handle) = self.built.get(id) {
            return Ok(Some(Arc::clone(handle)));
        }
        if let Some(handle) = self.existing.get(id) {
            if handle.validity() == Validity::FullyValid {
                self.built.insert(id.clone(), Arc::clone(handle));
                return Ok(Some(Arc::clone(handle)));
            }
        }
        let Some(metadata) = self.meta.unit(id).cloned() else {
            return Err(Error::UnknownUnit(id.clone()));
        };
        if !self.visiting.insert(id.clone()) {
            return Ok(None);
        }

        let mut deps = Vec::new();
        let dep_ids: HashSet<&UnitId> = metadata.dep_ids().collect();
        for dep in dep_ids {
            if !self.meta.contains(dep) {
                continue;
            }
            if let Some(handle) = self.build(dep)? {
                deps.push((dep.clone(), handle.key()));
            }
        }

        let files: Vec<FileHandle> = metadata
            .files
            .iter()
            .map(|uri| {
                self.snapshot
                    .read_file(uri)
                    .unwrap_or_else(|err| FileHandle::failed(uri.clone(), err))
            })
            .collect();

        let handle = Arc::new(UnitHandle::new(metadata, &files, &deps));
        self.visiting.remove(id);
        self.built.insert(id.clone(), Arc::clone(&handle));
        Ok(Some(handle))
    }
}
