use std::path::{Path, PathBuf};

use strata_core::Fingerprint;

use crate::entry;
use crate::error::Result;
use crate::{ArtifactCache, ArtifactKind};

/// File-per-entry artifact cache rooted at a directory.
///
/// Entries live at `<root>/<kind>/<first two hex digits>/<key>.bin` and carry
/// a versioned envelope that repeats the kind and key, so a corrupted,
/// misplaced or stale file reads as a miss (and is deleted) rather than as
/// wrong data.
#[derive(Debug, Clone)]
pub struct DiskArtifactCache {
    root: PathBuf,
}

impl DiskArtifactCache {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, kind: ArtifactKind, key: &Fingerprint) -> PathBuf {
        let hex = key.to_hex();
        self.root
            .join(kind.as_str())
            .join(&hex[..2])
            .join(format!("{hex}.bin"))
    }
}

impl ArtifactCache for DiskArtifactCache {
    fn get(&self, kind: ArtifactKind, key: &Fingerprint) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(kind, key);
        let Some(raw) = entry::read(&path) else {
            return Ok(None);
        };
        match entry::decode(kind, key, &raw) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => {
                tracing::debug!(
                    target = "strata.cache",
                    path = %path.display(),
                    error = %err,
                    "unusable cache entry"
                );
                entry::discard(&path, "unusable");
                Ok(None)
            }
        }
    }

    fn set(&self, kind: ArtifactKind, key: &Fingerprint, bytes: &[u8]) -> Result<()> {
        let raw = entry::encode(kind, key, bytes)?;
        entry::write(&self.entry_path(kind, key), &raw)
    }
}
