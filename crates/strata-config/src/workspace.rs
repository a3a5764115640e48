use std::sync::OnceLock;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use strata_core::DocumentUri;

use crate::ConfigError;

/// How reloads are scoped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Reload individual unit paths.
    #[default]
    Module,
    /// The workspace has no module structure; every reload covers the whole
    /// workspace.
    Adhoc,
}

/// Workspace layout conventions and tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Glob patterns of workspace-definition files. Saving one, or changing
    /// one on disk, reinitializes the workspace.
    #[serde(default = "WorkspaceConfig::default_workspace_files")]
    pub workspace_files: Vec<String>,

    /// Base names of dependency manifests.
    #[serde(default = "WorkspaceConfig::default_manifest_files")]
    pub manifest_files: Vec<String>,

    /// Name of the vendored-dependency directory.
    #[serde(default = "WorkspaceConfig::default_vendor_dir")]
    pub vendor_dir: String,

    /// Extensions of files whose headers determine unit metadata.
    #[serde(default = "WorkspaceConfig::default_source_extensions")]
    pub source_extensions: Vec<String>,

    #[serde(default = "WorkspaceConfig::default_magic_comment_prefixes")]
    pub magic_comment_prefixes: Vec<String>,

    #[serde(default)]
    pub mode: LoadMode,

    /// Concurrent file reads during a bulk preload.
    #[serde(default = "WorkspaceConfig::default_preload_concurrency")]
    pub preload_concurrency: usize,

    #[serde(default = "WorkspaceConfig::default_header_cache_capacity")]
    pub header_cache_capacity: usize,

    #[serde(default)]
    pub allow_network: bool,

    #[serde(skip)]
    matcher: OnceLock<GlobSet>,
}

impl WorkspaceConfig {
    fn default_workspace_files() -> Vec<String> {
        vec!["**/strata.work".to_owned(), "**/*.workspace".to_owned()]
    }

    fn default_manifest_files() -> Vec<String> {
        vec!["strata.mod".to_owned()]
    }

    fn default_vendor_dir() -> String {
        "vendor".to_owned()
    }

    fn default_source_extensions() -> Vec<String> {
        vec!["src".to_owned()]
    }

    fn default_magic_comment_prefixes() -> Vec<String> {
        vec![
            "//build:".to_owned(),
            "//embed:".to_owned(),
            "// +build".to_owned(),
        ]
    }

    fn default_preload_concurrency() -> usize {
        20
    }

    fn default_header_cache_capacity() -> usize {
        1024
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let set = build_glob_set(&self.workspace_files)?;
        let _ = self.matcher.set(set);
        Ok(())
    }

    fn matcher(&self) -> &GlobSet {
        self.matcher.get_or_init(|| {
            build_glob_set(&self.workspace_files).unwrap_or_else(|err| {
                tracing::warn!(
                    target = "strata.config",
                    error = %err,
                    "ignoring invalid workspace file patterns"
                );
                GlobSet::empty()
            })
        })
    }

    /// Reports whether `uri` names a workspace-definition file.
    pub fn is_workspace_file(&self, uri: &DocumentUri) -> bool {
        self.matcher().is_match(uri.path())
    }

    pub fn is_manifest_file(&self, uri: &DocumentUri) -> bool {
        let base = uri.base_name();
        self.manifest_files.iter().any(|name| name == base)
    }

    pub fn is_source_file(&self, uri: &DocumentUri) -> bool {
        uri.extension()
            .is_some_and(|ext| self.source_extensions.iter().any(|e| e == ext))
    }

    /// Reports whether `uri` lies inside a vendored-dependency tree.
    pub fn in_vendor(&self, uri: &DocumentUri) -> bool {
        uri.dir().has_segment(&self.vendor_dir)
    }

    /// Reports whether `uri` is the vendor manifest (`<vendor>/modules.txt`).
    pub fn is_vendor_manifest(&self, uri: &DocumentUri) -> bool {
        uri.base_name() == "modules.txt" && uri.dir().base_name() == self.vendor_dir
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            workspace_files: Self::default_workspace_files(),
            manifest_files: Self::default_manifest_files(),
            vendor_dir: Self::default_vendor_dir(),
            source_extensions: Self::default_source_extensions(),
            magic_comment_prefixes: Self::default_magic_comment_prefixes(),
            mode: LoadMode::default(),
            preload_concurrency: Self::default_preload_concurrency(),
            header_cache_capacity: Self::default_header_cache_capacity(),
            allow_network: false,
            matcher: OnceLock::new(),
        }
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| ConfigError::InvalidGlob {
            pattern: pattern.clone(),
            message: err.kind().to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| ConfigError::InvalidGlob {
        pattern: patterns.join(","),
        message: err.kind().to_string(),
    })
}
