use std::collections::HashMap;

use parking_lot::RwLock;
use strata_core::Fingerprint;

use crate::{ArtifactCache, ArtifactKind, Result};

/// An in-process artifact cache.
#[derive(Debug, Default)]
pub struct MemoryArtifactCache {
    entries: RwLock<HashMap<(ArtifactKind, Fingerprint), Vec<u8>>>,
}

impl MemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ArtifactCache for MemoryArtifactCache {
    fn get(&self, kind: ArtifactKind, key: &Fingerprint) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(&(kind, *key)).cloned())
    }

    fn set(&self, kind: ArtifactKind, key: &Fingerprint, bytes: &[u8]) -> Result<()> {
        self.entries.write().insert((kind, *key), bytes.to_vec());
        Ok(())
    }
}
