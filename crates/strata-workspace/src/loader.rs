use std::fmt;

use async_trait::async_trait;
use strata_core::{DocumentUri, UnitPath};
use strata_metadata::UnitMetadata;
use strata_scheduler::CancellationToken;

/// What a load is asked to produce metadata for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadScope {
    /// The units containing one file.
    File(DocumentUri),
    /// One unit path, with its test variants.
    Path(UnitPath),
    /// Every unit of the workspace.
    Workspace,
}

impl fmt::Display for LoadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadScope::File(uri) => write!(f, "file={uri}"),
            LoadScope::Path(path) => write!(f, "path={path}"),
            LoadScope::Workspace => f.write_str("workspace"),
        }
    }
}

/// Metadata returned by a [`Loader`].
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub units: Vec<UnitMetadata>,
    /// The file declaring builtin identifiers, if the loader knows it.
    pub builtin: Option<DocumentUri>,
}

/// Produces unit metadata for a set of scopes, typically by invoking an
/// external build tool.
///
/// Returned units must form a closed graph: every resolved dependency id is
/// either in the result or already known. Implementations should stop early
/// once `cancel` fires; the snapshot discards the result either way.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(
        &self,
        scopes: &[LoadScope],
        allow_network: bool,
        cancel: &CancellationToken,
    ) -> anyhow::Result<LoadResult>;
}

/// Identifies a load for coalescing: the sorted, deduplicated scope list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadKey(Vec<LoadScope>);

impl LoadKey {
    pub fn new(mut scopes: Vec<LoadScope>) -> Self {
        scopes.sort();
        scopes.dedup();
        Self(scopes)
    }

    pub fn scopes(&self) -> &[LoadScope] {
        &self.0
    }

    pub fn is_workspace(&self) -> bool {
        self.0.contains(&LoadScope::Workspace)
    }
}

impl fmt::Display for LoadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, scope) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{scope}")?;
        }
        Ok(())
    }
}
