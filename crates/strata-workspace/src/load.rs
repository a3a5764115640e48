//! Loading metadata into a snapshot.
//!
//! Loads never block clones: the loader runs without the header lock held,
//! and its result is merged under the lock afterwards. Units already present
//! in the graph are left alone, so a stale load cannot undo an invalidation
//! recorded by a newer clone of the same snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use strata_config::LoadMode;
use strata_core::{DocumentUri, UnitId};
use strata_memoize::PromiseError;
use strata_metadata::{MetadataGraph, UnitMetadata};
use strata_scheduler::{check, run_until_cancelled, CancellationToken, Cancelled};
use tracing::Instrument;

use crate::error::{Error, LoadError, Result};
use crate::loader::{LoadKey, LoadScope};
use crate::snapshot::Snapshot;

impl Snapshot {
    /// Loads `scopes` and merges the result into this snapshot.
    ///
    /// Concurrent loads of the same scope set share one loader invocation.
    pub(crate) async fn load(
        self: &Arc<Self>,
        scopes: Vec<LoadScope>,
        allow_network: bool,
        token: &CancellationToken,
    ) -> Result<(), LoadError> {
        let key = LoadKey::new(scopes);
        let this = Arc::clone(self);
        let promise = self.loads.promise(key.clone(), move |cancel| {
            let this = Arc::clone(&this);
            let key = key.clone();
            async move {
                match this.run_load(&key, allow_network, &cancel).await {
                    Err(LoadError::Cancelled) => Err(PromiseError::Cancelled),
                    outcome => Ok(outcome),
                }
            }
        });
        promise.get(token).await?
    }

    async fn run_load(
        self: &Arc<Self>,
        key: &LoadKey,
        allow_network: bool,
        cancel: &CancellationToken,
    ) -> Result<(), LoadError> {
        let span = tracing::debug_span!("snapshot.load", seq = self.sequence_id(), scopes = %key);
        async move {
            let loader = Arc::clone(&self.view.loader);
            let loaded = run_until_cancelled(
                self.background.token(),
                loader.load(key.scopes(), allow_network, cancel),
            )
            .await?;
            let result = match loaded {
                Ok(result) => result,
                Err(_) if cancel.is_cancelled() => return Err(LoadError::Cancelled),
                Err(err) => return Err(err.into()),
            };
            check(cancel)?;

            if result.units.is_empty() && !key.is_workspace() {
                return Err(LoadError::NoUnits {
                    scopes: key.to_string(),
                });
            }

            let new_files = self.merge_units(result.units, result.builtin);
            tracing::debug!(
                target = "strata.workspace",
                new_files = new_files.len(),
                "load merged"
            );
            match self.preload_files(new_files, cancel).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_cancelled() => Err(LoadError::Cancelled),
                Err(err) => {
                    tracing::debug!(target = "strata.workspace", error = %err, "preload failed");
                    Ok(())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Adds newly loaded units to the graph and returns their files.
    fn merge_units(
        &self,
        units: Vec<UnitMetadata>,
        builtin: Option<DocumentUri>,
    ) -> Vec<DocumentUri> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut files = BTreeSet::new();
        let mut updates: BTreeMap<UnitId, Option<UnitMetadata>> = BTreeMap::new();
        for unit in units {
            if state.meta.contains(&unit.id) {
                continue;
            }
            state.should_load.delete(&unit.id);
            // A handle without metadata would outlive its inputs.
            state.units.delete(&unit.id);
            files.extend(unit.files.iter().cloned());
            updates.insert(unit.id.clone(), Some(unit));
        }
        if builtin.is_some() {
            state.builtin = builtin;
        }
        state.meta = state.meta.update(updates);
        state.meta.validate();
        state.recompute_workspace_units(&self.view);
        files.into_iter().collect()
    }

    /// Forgets reload markers covered by `scopes`.
    pub(crate) fn clear_should_load(&self, scopes: &[LoadScope]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for scope in scopes {
            match scope {
                LoadScope::Path(path) => {
                    state
                        .should_load
                        .retain(|_, paths| !paths.contains(path));
                }
                LoadScope::File(uri) => {
                    for id in state.meta.ids_for_file(uri) {
                        state.should_load.delete(id);
                    }
                }
                LoadScope::Workspace => state.should_load.clear(),
            }
        }
    }

    /// Loads the whole workspace once.
    ///
    /// Marks the snapshot initialized and records the outcome, unless the
    /// attempt was cancelled, in which case the next caller tries again.
    pub async fn initialize(self: &Arc<Self>, token: &CancellationToken) -> Result<()> {
        self.check_live()?;
        if self.state.lock().initialized {
            return Ok(());
        }
        let _initializing = run_until_cancelled(token, self.initialization.lock()).await?;
        if self.state.lock().initialized {
            return Ok(());
        }
        let allow_network = self.view.config.allow_network;
        let outcome = self
            .load(vec![LoadScope::Workspace], allow_network, token)
            .await;
        if let Err(LoadError::Cancelled) = outcome {
            return Err(Error::Cancelled);
        }
        if let Err(err) = &outcome {
            tracing::warn!(
                target = "strata.workspace",
                seq = self.sequence_id(),
                error = %err,
                "initial workspace load failed"
            );
        }
        let mut state = self.state.lock();
        state.initialized = true;
        state.init_error = outcome.err();
        Ok(())
    }

    /// Reloads every unit marked for reload.
    pub async fn reload_workspace(self: &Arc<Self>, token: &CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        let mut scopes: Vec<LoadScope> = {
            let state = self.state.lock();
            let paths: BTreeSet<_> = state.should_load.values().flatten().cloned().collect();
            paths.into_iter().map(LoadScope::Path).collect()
        };
        if scopes.is_empty() {
            return;
        }
        if self.view.config.mode == LoadMode::Adhoc {
            scopes = vec![LoadScope::Workspace];
        }

        let outcome = self.load(scopes.clone(), false, token).await;
        match outcome {
            Err(LoadError::Cancelled) => {}
            outcome => {
                self.clear_should_load(&scopes);
                if let Err(err) = outcome {
                    tracing::warn!(
                        target = "strata.workspace",
                        seq = self.sequence_id(),
                        error = %err,
                        "reloading workspace failed"
                    );
                }
            }
        }
    }

    /// Waits for initialization and any pending reloads.
    pub async fn await_loaded(self: &Arc<Self>, token: &CancellationToken) -> Result<()> {
        self.initialize(token).await?;
        self.reload_workspace(token).await;
        check(token)?;
        Ok(())
    }

    /// The units containing `uri`, narrowest first.
    ///
    /// Loads the file first when it belongs to no unit or one of its units is
    /// marked for reload. A file that still has no units afterwards is
    /// remembered as unloadable and not retried until a metadata-affecting
    /// edit. Load failures other than cancellation are logged and the
    /// possibly stale result is returned.
    pub async fn metadata_for_file(
        self: &Arc<Self>,
        uri: &DocumentUri,
        remove_intermediate_test_variants: bool,
        token: &CancellationToken,
    ) -> Result<Vec<Arc<UnitMetadata>>> {
        self.check_live()?;
        if self.view.config.mode == LoadMode::Adhoc {
            self.await_loaded(token).await?;
        }

        let (needs_load, unloadable) = {
            let state = self.state.lock();
            let ids = state.meta.ids_for_file(uri);
            let should_load = ids
                .iter()
                .any(|id| state.should_load.get(id).is_some_and(|p| !p.is_empty()));
            (
                should_load || ids.is_empty(),
                state.unloadable_files.contains(uri),
            )
        };

        if needs_load && !unloadable {
            let scope = LoadScope::File(uri.clone());
            let outcome = self.load(vec![scope.clone()], false, token).await;
            if token.is_cancelled() {
                return Err(Cancelled.into());
            }
            match outcome {
                Ok(()) | Err(LoadError::NoUnits { .. }) => {}
                Err(LoadError::Cancelled) => return Err(Error::Cancelled),
                Err(err) => tracing::warn!(
                    target = "strata.workspace",
                    %uri,
                    error = %err,
                    "loading metadata for file failed"
                ),
            }
            self.clear_should_load(&[scope]);
        }

        let mut state = self.state.lock();
        let mut units = state.meta.for_file(uri);
        if !unloadable && units.is_empty() {
            state.unloadable_files.add(uri.clone());
        }
        if remove_intermediate_test_variants {
            MetadataGraph::remove_intermediate_test_variants(&mut units);
        }
        Ok(units)
    }

    /// The narrowest unit containing `uri`, ignoring intermediate test
    /// variants.
    pub async fn narrowest_metadata_for_file(
        self: &Arc<Self>,
        uri: &DocumentUri,
        token: &CancellationToken,
    ) -> Result<Arc<UnitMetadata>> {
        let units = self.metadata_for_file(uri, true, token).await?;
        units
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoUnitsForFile(uri.clone()))
    }
}
