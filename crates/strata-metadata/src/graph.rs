use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use strata_core::{DocumentUri, UnitId};
use strata_persistent::Map;

use crate::unit::UnitMetadata;

/// An immutable graph of unit metadata.
///
/// Forward edges live on each [`UnitMetadata`]; the graph adds the reverse
/// edges and a file -> units index. Graphs are shared through `Arc` and never
/// mutated; [`MetadataGraph::update`] derives a new one that shares every
/// index entry the change did not touch.
#[derive(Debug, Default)]
pub struct MetadataGraph {
    units: Map<UnitId, Arc<UnitMetadata>>,
    /// Sorted importer ids for each imported unit.
    imported_by: Map<UnitId, Vec<UnitId>>,
    /// Narrowest-first unit ids for each file.
    by_file: Map<DocumentUri, Vec<UnitId>>,
}

impl MetadataGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds a graph from a complete set of units.
    pub fn from_units(units: impl IntoIterator<Item = UnitMetadata>) -> Arc<Self> {
        let mut graph = Self::default();
        graph.apply(
            units
                .into_iter()
                .map(|unit| (unit.id.clone(), Some(unit))),
        );
        Arc::new(graph)
    }

    /// Replaces or removes units, keeping both indexes in step.
    fn apply(&mut self, changes: impl IntoIterator<Item = (UnitId, Option<UnitMetadata>)>) {
        let mut touched: BTreeSet<DocumentUri> = BTreeSet::new();
        for (id, unit) in changes {
            if let Some(old) = self.units.remove(&id) {
                self.unlink(&old);
            }
            if let Some(unit) = unit {
                self.link(&unit, &mut touched);
                self.units.set(id, Arc::new(unit));
            }
        }
        for uri in touched {
            let Some(ids) = self.by_file.get(&uri) else {
                continue;
            };
            let mut ids = ids.clone();
            ids.sort_by_cached_key(|id| {
                let unit = self.units.get(id);
                (
                    unit.map_or(usize::MAX, |u| u.files.len()),
                    unit.is_some_and(|u| u.is_test_variant()),
                    id.clone(),
                )
            });
            self.by_file.set(uri, ids);
        }
    }

    fn link(&mut self, unit: &UnitMetadata, touched: &mut BTreeSet<DocumentUri>) {
        for dep in unit.dep_ids().collect::<BTreeSet<_>>() {
            let mut importers = self.imported_by.get(dep).cloned().unwrap_or_default();
            if let Err(at) = importers.binary_search(&unit.id) {
                importers.insert(at, unit.id.clone());
                self.imported_by.set(dep.clone(), importers);
            }
        }
        for uri in &unit.files {
            let mut ids = self.by_file.get(uri).cloned().unwrap_or_default();
            if !ids.contains(&unit.id) {
                ids.push(unit.id.clone());
                self.by_file.set(uri.clone(), ids);
            }
            touched.insert(uri.clone());
        }
    }

    fn unlink(&mut self, unit: &UnitMetadata) {
        for dep in unit.dep_ids().collect::<BTreeSet<_>>() {
            remove_from_index(&mut self.imported_by, dep, &unit.id);
        }
        for uri in &unit.files {
            remove_from_index(&mut self.by_file, uri, &unit.id);
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = &Arc<UnitMetadata>> + '_ {
        self.units.values()
    }

    pub fn unit(&self, id: &UnitId) -> Option<&Arc<UnitMetadata>> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &UnitId) -> bool {
        self.units.contains_key(id)
    }

    /// Units containing `uri`, narrowest first: fewer files first, then
    /// regular units before test variants.
    pub fn for_file(&self, uri: &DocumentUri) -> Vec<Arc<UnitMetadata>> {
        self.ids_for_file(uri)
            .iter()
            .filter_map(|id| self.units.get(id).cloned())
            .collect()
    }

    pub fn ids_for_file(&self, uri: &DocumentUri) -> &[UnitId] {
        self.by_file.get(uri).map_or(&[], Vec::as_slice)
    }

    /// Every known file with the ids of the units containing it.
    pub fn files(&self) -> impl Iterator<Item = (&DocumentUri, &[UnitId])> + '_ {
        self.by_file.iter().map(|(uri, ids)| (uri, ids.as_slice()))
    }

    /// Units that directly import `id`.
    pub fn imported_by(&self, id: &UnitId) -> &[UnitId] {
        self.imported_by.get(id).map_or(&[], Vec::as_slice)
    }

    /// Units that depend on `id`, directly or (if `transitive`) indirectly.
    /// `id` itself is never included.
    pub fn reverse_dependencies(
        &self,
        id: &UnitId,
        transitive: bool,
    ) -> BTreeMap<UnitId, Arc<UnitMetadata>> {
        let mut out = BTreeMap::new();
        let mut stack: Vec<&UnitId> = self.imported_by(id).iter().collect();
        while let Some(next) = stack.pop() {
            if next == id || out.contains_key(next) {
                continue;
            }
            let Some(unit) = self.units.get(next) else {
                continue;
            };
            out.insert(next.clone(), Arc::clone(unit));
            if transitive {
                stack.extend(self.imported_by(next));
            }
        }
        out
    }

    /// Applies `changes` and returns the resulting graph.
    ///
    /// `None` removes a unit, `Some` inserts or replaces it. No cascading is
    /// performed. An empty change set returns `self` unchanged, so callers can
    /// detect "graph changed" by pointer comparison.
    pub fn update(
        self: &Arc<Self>,
        changes: BTreeMap<UnitId, Option<UnitMetadata>>,
    ) -> Arc<MetadataGraph> {
        if changes.is_empty() {
            return Arc::clone(self);
        }
        let mut next = Self {
            units: self.units.clone(),
            imported_by: self.imported_by.clone(),
            by_file: self.by_file.clone(),
        };
        next.apply(changes);
        let next = Arc::new(next);
        tracing::trace!(
            target = "strata.metadata",
            before = self.len(),
            after = next.len(),
            "metadata graph updated"
        );
        next
    }

    /// Reports every dangling dependency edge through the bug reporter.
    ///
    /// Returns whether the graph is consistent.
    pub fn validate(&self) -> bool {
        let mut ok = true;
        for unit in self.units.values() {
            for (path, dep) in &unit.deps_by_path {
                if let Some(dep) = dep {
                    if !self.units.contains_key(dep) {
                        strata_core::bug!(
                            "unit {} depends on {path} -> {dep}, which is neither loaded nor unresolved",
                            unit.id
                        );
                        ok = false;
                    }
                }
            }
        }
        ok
    }

    /// Drops intermediate test variants from `units`, unless that would leave
    /// it empty.
    pub fn remove_intermediate_test_variants(units: &mut Vec<Arc<UnitMetadata>>) {
        if units.iter().all(|u| u.is_intermediate_test_variant()) {
            return;
        }
        units.retain(|u| !u.is_intermediate_test_variant());
    }
}

fn remove_from_index<K: Ord + Clone>(index: &mut Map<K, Vec<UnitId>>, key: &K, id: &UnitId) {
    let Some(ids) = index.get(key) else {
        return;
    };
    if !ids.contains(id) {
        return;
    }
    let rest: Vec<UnitId> = ids.iter().filter(|other| *other != id).cloned().collect();
    if rest.is_empty() {
        index.delete(key);
    } else {
        index.set(key.clone(), rest);
    }
}
