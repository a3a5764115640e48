use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_core::{DocumentUri, ImportPath, UnitId, UnitPath};

/// Id prefix of units synthesized for files loaded outside any unit.
pub const SYNTHETIC_UNIT_PREFIX: &str = "command-line-arguments";

/// A load error attached to a unit (e.g. an import cycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub message: String,
    pub uri: Option<DocumentUri>,
}

impl UnitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            uri: None,
        }
    }
}

/// Structural facts about one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    pub id: UnitId,
    pub path: UnitPath,
    pub name: String,
    pub files: Vec<DocumentUri>,
    /// Declared dependencies. `None` records an import that did not resolve.
    pub deps_by_path: BTreeMap<ImportPath, Option<UnitId>>,
    pub errors: Vec<UnitError>,
    /// For test variants, the path of the unit under test.
    pub for_test: Option<UnitPath>,
    /// The manifest file of the module that owns this unit.
    pub module: Option<DocumentUri>,
}

impl UnitMetadata {
    pub fn new(id: impl Into<UnitId>, path: impl Into<UnitPath>) -> Self {
        let path = path.into();
        let name = path
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned();
        Self {
            id: id.into(),
            path,
            name,
            files: Vec::new(),
            deps_by_path: BTreeMap::new(),
            errors: Vec::new(),
            for_test: None,
            module: None,
        }
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = DocumentUri>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn with_dep(mut self, path: impl Into<ImportPath>, id: Option<UnitId>) -> Self {
        self.deps_by_path.insert(path.into(), id);
        self
    }

    pub fn with_error(mut self, error: UnitError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn for_test(mut self, path: impl Into<UnitPath>) -> Self {
        self.for_test = Some(path.into());
        self
    }

    /// Whether the unit is compiled together with test files.
    pub fn is_test_variant(&self) -> bool {
        self.for_test.is_some()
    }

    /// A test variant of a non-test unit pulled in only because a unit under
    /// test depends on it. These are never the "right" unit for a file.
    pub fn is_intermediate_test_variant(&self) -> bool {
        match &self.for_test {
            Some(for_test) => {
                for_test != &self.path
                    && format!("{}_test", for_test.as_str()) != self.path.as_str()
            }
            None => false,
        }
    }

    /// Units synthesized for ad-hoc files are never recorded for reload.
    pub fn is_synthetic(&self) -> bool {
        self.id.as_str().starts_with(SYNTHETIC_UNIT_PREFIX)
    }

    /// Resolved dependency ids.
    pub fn dep_ids(&self) -> impl Iterator<Item = &UnitId> + '_ {
        self.deps_by_path.values().flatten()
    }

    pub fn has_unresolved_deps(&self) -> bool {
        self.deps_by_path.values().any(Option::is_none)
    }

    pub fn contains(&self, uri: &DocumentUri) -> bool {
        self.files.contains(uri)
    }
}
