use std::collections::{BTreeMap, BTreeSet};

use strata_core::{DocumentUri, UnitId, UnitPath};

use crate::graph::MetadataGraph;
use crate::unit::UnitMetadata;

/// What counts as "the workspace" when selecting top-level units.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceScope {
    /// Root directories of the workspace.
    pub roots: Vec<DocumentUri>,
    /// Files currently open in the editor.
    pub open_files: BTreeSet<DocumentUri>,
}

impl WorkspaceScope {
    fn includes(&self, unit: &UnitMetadata) -> bool {
        if unit.files.iter().any(|f| self.open_files.contains(f)) {
            return true;
        }
        let under_root = |uri: &DocumentUri| self.roots.iter().any(|root| root.encloses(uri));
        match &unit.module {
            Some(module) => under_root(module),
            None => unit.files.iter().any(under_root),
        }
    }
}

/// Computes the top-level workspace units and the path to load each by.
///
/// A unit qualifies when it contains an open file or lives under a workspace
/// root. Test variants are keyed by the path of the unit under test;
/// intermediate test variants are excluded.
pub fn compute_workspace_units(
    graph: &MetadataGraph,
    scope: &WorkspaceScope,
) -> BTreeMap<UnitId, UnitPath> {
    let mut out = BTreeMap::new();
    for unit in graph.units() {
        if unit.is_intermediate_test_variant() || !scope.includes(unit) {
            continue;
        }
        let path = unit.for_test.clone().unwrap_or_else(|| unit.path.clone());
        out.insert(unit.id.clone(), path);
    }
    out
}
