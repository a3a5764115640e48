use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

const FILE_SCHEME: &str = "file://";

/// A `file://` document URI in canonical form.
///
/// URIs are compared as strings; callers are expected to hand in canonical
/// URIs (forward slashes, no trailing slash).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentUri(String);

impl DocumentUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Builds a URI from an absolute local path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().replace('\\', "/");
        let path = path.trim_end_matches('/');
        if path.starts_with('/') {
            Self(format!("{FILE_SCHEME}{path}"))
        } else {
            Self(format!("{FILE_SCHEME}/{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path component of the URI.
    pub fn path(&self) -> &str {
        self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0)
    }

    /// The path of the directory containing this URI.
    pub fn dir_path(&self) -> &str {
        let path = self.path();
        match path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &path[..idx],
            None => "",
        }
    }

    /// The URI of the directory containing this URI.
    pub fn dir(&self) -> DocumentUri {
        DocumentUri(format!("{FILE_SCHEME}{}", self.dir_path()))
    }

    pub fn base_name(&self) -> &str {
        let path = self.path();
        match path.rfind('/') {
            Some(idx) => &path[idx + 1..],
            None => path,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        let base = self.base_name();
        let idx = base.rfind('.')?;
        (idx > 0).then(|| &base[idx + 1..])
    }

    /// Reports whether `other` lies within the directory denoted by `self`.
    pub fn encloses(&self, other: &DocumentUri) -> bool {
        in_dir(self.path(), other.path())
    }

    /// Reports whether any path segment equals `segment`.
    pub fn has_segment(&self, segment: &str) -> bool {
        self.path().split('/').any(|s| s == segment)
    }
}

/// Reports whether `path` equals `dir` or lies beneath it.
pub fn in_dir(dir: &str, path: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return path.starts_with('/');
    }
    path == dir || (path.starts_with(dir) && path.as_bytes().get(dir.len()) == Some(&b'/'))
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentUri {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
