//! In-memory collaborators for driving a workspace in tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use strata_cache::ArtifactKind;
use strata_config::StrataConfig;
use strata_core::{DocumentUri, UnitId};
use strata_metadata::UnitMetadata;
use strata_vfs::{FileAction, FileHandle, FileSource, Modification, ReadError};
use strata_workspace::{
    CancellationToken, CheckInput, CheckedUnit, Collaborators, LoadResult, LoadScope, Loader,
    SnapshotRef, TypeChecker, Workspace,
};

pub fn uri(path: &str) -> DocumentUri {
    DocumentUri::from_path(path)
}

pub fn id(value: &str) -> UnitId {
    UnitId::from(value)
}

/// File contents keyed by URI, standing in for the disk.
#[derive(Default)]
pub struct MapSource {
    files: Mutex<HashMap<DocumentUri, String>>,
}

impl MapSource {
    pub fn set(&self, path: &str, text: &str) {
        self.files.lock().insert(uri(path), text.to_owned());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().remove(&uri(path));
    }
}

impl FileSource for MapSource {
    fn read_file(&self, uri: &DocumentUri) -> Result<FileHandle, ReadError> {
        Ok(match self.files.lock().get(uri) {
            Some(text) => FileHandle::on_disk(uri.clone(), text.as_str()),
            None => FileHandle::missing(uri.clone()),
        })
    }
}

/// Answers loads from a fixed set of units, returning each requested unit
/// together with its transitive dependencies.
#[derive(Default)]
pub struct WorldLoader {
    world: Mutex<BTreeMap<UnitId, UnitMetadata>>,
    calls: Mutex<Vec<Vec<LoadScope>>>,
    delay: Mutex<Option<Duration>>,
    block: AtomicBool,
    fail: AtomicBool,
}

impl WorldLoader {
    pub fn put(&self, unit: UnitMetadata) {
        self.world.lock().insert(unit.id.clone(), unit);
    }

    pub fn calls(&self) -> Vec<Vec<LoadScope>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Makes every load wait until it is cancelled.
    pub fn set_blocking(&self, block: bool) {
        self.block.store(block, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn select(&self, scopes: &[LoadScope]) -> Vec<UnitMetadata> {
        let world = self.world.lock();
        let mut picked = BTreeSet::new();
        for scope in scopes {
            for unit in world.values() {
                let hit = match scope {
                    LoadScope::Workspace => true,
                    LoadScope::Path(path) => {
                        &unit.path == path || unit.for_test.as_ref() == Some(path)
                    }
                    LoadScope::File(uri) => unit.contains(uri),
                };
                if hit {
                    picked.insert(unit.id.clone());
                }
            }
        }
        let mut stack: Vec<UnitId> = picked.iter().cloned().collect();
        while let Some(next) = stack.pop() {
            let Some(unit) = world.get(&next) else {
                continue;
            };
            for dep in unit.dep_ids() {
                if picked.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }
        picked
            .iter()
            .filter_map(|id| world.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl Loader for WorldLoader {
    async fn load(
        &self,
        scopes: &[LoadScope],
        _allow_network: bool,
        cancel: &CancellationToken,
    ) -> anyhow::Result<LoadResult> {
        self.calls.lock().push(scopes.to_vec());
        if self.block.load(Ordering::SeqCst) {
            cancel.cancelled().await;
            anyhow::bail!("load interrupted");
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("build tool exited with status 1");
        }
        Ok(LoadResult {
            units: self.select(scopes),
            builtin: None,
        })
    }
}

/// Produces one artifact per kind and counts checks per unit.
#[derive(Default)]
pub struct CountingChecker {
    checks: Mutex<BTreeMap<UnitId, usize>>,
    total: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failing: Mutex<HashSet<UnitId>>,
}

impl CountingChecker {
    pub fn checks(&self, unit: &str) -> usize {
        self.checks.lock().get(&id(unit)).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fail_on(&self, unit: &str) {
        self.failing.lock().insert(id(unit));
    }
}

#[async_trait]
impl TypeChecker for CountingChecker {
    async fn check(
        &self,
        unit: CheckInput,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<CheckedUnit> {
        let unit_id = unit.metadata.id.clone();
        *self.checks.lock().entry(unit_id.clone()).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&unit_id) {
            anyhow::bail!("{unit_id}: syntax error");
        }
        let artifacts = ArtifactKind::ALL
            .iter()
            .map(|kind| (*kind, render(*kind, &unit)))
            .collect();
        Ok(CheckedUnit {
            id: unit_id,
            artifacts,
        })
    }
}

/// The bytes [`CountingChecker`] produces for `kind`.
pub fn render(kind: ArtifactKind, unit: &CheckInput) -> Vec<u8> {
    let bytes: usize = unit
        .files
        .iter()
        .map(|fh| fh.content().map_or(0, str::len))
        .sum();
    format!(
        "{}:{}:{}:{}",
        kind.as_str(),
        unit.metadata.id,
        unit.deps.len(),
        bytes
    )
    .into_bytes()
}

pub struct Harness {
    pub workspace: Workspace,
    pub source: Arc<MapSource>,
    pub loader: Arc<WorldLoader>,
    pub checker: Arc<CountingChecker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_collaborators(|collaborators| collaborators)
    }

    pub fn with_collaborators(adjust: impl FnOnce(Collaborators) -> Collaborators) -> Self {
        Self::build(StrataConfig::default(), adjust)
    }

    pub fn build(
        config: StrataConfig,
        adjust: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        let source = Arc::new(MapSource::default());
        let loader = Arc::new(WorldLoader::default());
        let checker = Arc::new(CountingChecker::default());
        let collaborators = adjust(Collaborators::new(
            Arc::clone(&source) as Arc<dyn FileSource>,
            Arc::clone(&loader) as Arc<dyn Loader>,
            Arc::clone(&checker) as Arc<dyn TypeChecker>,
        ));
        let workspace = Workspace::new(config, vec![uri("/ws")], collaborators).unwrap();
        Self {
            workspace,
            source,
            loader,
            checker,
        }
    }

    /// Adds a unit to both the disk and the loader's world. `files` pairs
    /// paths with contents.
    pub fn unit(&self, unit_id: &str, files: &[(&str, &str)], imports: &[&str]) {
        let mut unit = UnitMetadata::new(unit_id, unit_id)
            .with_files(files.iter().map(|(path, _)| uri(path)));
        for import in imports {
            unit = unit.with_dep(*import, Some(id(import)));
        }
        for (path, text) in files {
            self.source.set(path, text);
        }
        self.loader.put(unit);
    }

    /// The chain `ws/c -> ws/b -> ws/a` plus an unrelated `ws/d`.
    pub fn with_chain() -> Self {
        Self::with_chain_and(|collaborators| collaborators)
    }

    pub fn with_chain_and(adjust: impl FnOnce(Collaborators) -> Collaborators) -> Self {
        let harness = Self::with_collaborators(adjust);
        harness.add_chain();
        harness
    }

    pub fn add_chain(&self) {
        self.unit("ws/a", &[("/ws/a/a.src", "unit a\n")], &[]);
        self.unit(
            "ws/b",
            &[("/ws/b/b.src", "unit b\nimport \"ws/a\"\n")],
            &["ws/a"],
        );
        self.unit(
            "ws/c",
            &[("/ws/c/c.src", "unit c\nimport \"ws/b\"\n")],
            &["ws/b"],
        );
        self.unit("ws/d", &[("/ws/d/d.src", "unit d\n")], &[]);
    }

    pub fn snapshot(&self) -> SnapshotRef {
        self.workspace.snapshot().unwrap()
    }

    /// Initializes the current snapshot and builds handles for every unit.
    pub async fn loaded(&self) -> SnapshotRef {
        let snapshot = self.snapshot();
        let token = CancellationToken::new();
        snapshot.initialize(&token).await.unwrap();
        let ids: Vec<UnitId> = snapshot
            .metadata_graph()
            .units()
            .map(|unit| unit.id.clone())
            .collect();
        snapshot.unit_handles(&ids).unwrap();
        snapshot
    }

    /// Rewrites `path` on disk and reports it as changed.
    pub fn disk_edit(&self, path: &str, text: &str) -> (SnapshotRef, bool) {
        self.source.set(path, text);
        self.workspace
            .did_modify_files(vec![Modification::on_disk(uri(path), FileAction::Change)])
            .unwrap()
    }

    pub fn disk_event(&self, path: &str, action: FileAction) -> (SnapshotRef, bool) {
        self.workspace
            .did_modify_files(vec![Modification::on_disk(uri(path), action)])
            .unwrap()
    }
}
