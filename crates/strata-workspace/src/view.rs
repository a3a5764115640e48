use std::fmt;
use std::sync::Arc;

use strata_cache::{ArtifactCache, MemoryArtifactCache};
use strata_config::WorkspaceConfig;
use strata_core::{DocumentUri, Fingerprint};
use strata_memoize::Store;
use strata_metadata::WorkspaceScope;
use strata_scheduler::BackgroundScope;
use strata_vfs::FileSource;

use crate::check::{CheckedUnit, TypeChecker};
use crate::header::{HeaderCache, HeaderParser, SimpleHeaderParser};
use crate::loader::Loader;

/// The external services a workspace depends on.
pub struct Collaborators {
    pub source: Arc<dyn FileSource>,
    pub loader: Arc<dyn Loader>,
    pub checker: Arc<dyn TypeChecker>,
    /// Defaults to [`SimpleHeaderParser`] with the configured magic comment
    /// prefixes.
    pub header_parser: Option<Arc<dyn HeaderParser>>,
    /// Defaults to the on-disk cache when `cache.dir` is configured, else an
    /// in-memory one.
    pub artifacts: Option<Arc<dyn ArtifactCache>>,
}

impl Collaborators {
    pub fn new(
        source: Arc<dyn FileSource>,
        loader: Arc<dyn Loader>,
        checker: Arc<dyn TypeChecker>,
    ) -> Self {
        Self {
            source,
            loader,
            checker,
            header_parser: None,
            artifacts: None,
        }
    }

    pub fn with_header_parser(mut self, parser: Arc<dyn HeaderParser>) -> Self {
        self.header_parser = Some(parser);
        self
    }

    pub fn with_artifact_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.artifacts = Some(cache);
        self
    }
}

/// The immutable definition of a workspace, shared by all of its snapshots.
pub(crate) struct View {
    pub(crate) config: Arc<WorkspaceConfig>,
    pub(crate) roots: Vec<DocumentUri>,
    pub(crate) source: Arc<dyn FileSource>,
    pub(crate) loader: Arc<dyn Loader>,
    pub(crate) checker: Arc<dyn TypeChecker>,
    pub(crate) artifacts: Arc<dyn ArtifactCache>,
    pub(crate) headers: HeaderCache,
    /// Check results by unit key, shared across snapshots.
    pub(crate) checks: Store<Fingerprint, Arc<CheckedUnit>>,
    pub(crate) background: BackgroundScope,
}

impl View {
    pub(crate) fn new(
        config: WorkspaceConfig,
        roots: Vec<DocumentUri>,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            source,
            loader,
            checker,
            header_parser,
            artifacts,
        } = collaborators;
        let parser = header_parser.unwrap_or_else(|| {
            Arc::new(SimpleHeaderParser::new(
                config.magic_comment_prefixes.clone(),
            ))
        });
        let headers = HeaderCache::new(parser, config.header_cache_capacity);
        Self {
            config: Arc::new(config),
            roots,
            source,
            loader,
            checker,
            artifacts: artifacts.unwrap_or_else(|| Arc::new(MemoryArtifactCache::new())),
            headers,
            checks: Store::new(),
            background: BackgroundScope::new(),
        }
    }

    pub(crate) fn workspace_scope(
        &self,
        open_files: impl IntoIterator<Item = DocumentUri>,
    ) -> WorkspaceScope {
        WorkspaceScope {
            roots: self.roots.clone(),
            open_files: open_files.into_iter().collect(),
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("roots", &self.roots)
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}
