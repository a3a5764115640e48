use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::DocumentUri;

use crate::handle::FileHandle;
use crate::source::{FileSource, ReadError};

#[derive(Debug, Clone)]
struct Buffer {
    text: Arc<str>,
    version: i32,
    saved: bool,
}

/// A file source that serves open editor buffers before delegating to a base
/// source.
#[derive(Debug, Clone)]
pub struct OverlaySource<S> {
    base: S,
    buffers: Arc<Mutex<HashMap<DocumentUri, Buffer>>>,
}

impl<S: FileSource> OverlaySource<S> {
    pub fn new(base: S) -> Self {
        Self {
            base,
            buffers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn base(&self) -> &S {
        &self.base
    }

    /// Opens a buffer. Freshly opened buffers are considered saved.
    pub fn open(&self, uri: DocumentUri, text: impl Into<Arc<str>>, version: i32) {
        self.buffers.lock().insert(
            uri,
            Buffer {
                text: text.into(),
                version,
                saved: true,
            },
        );
    }

    /// Replaces the text of an open buffer. Returns false if it is not open.
    pub fn change(&self, uri: &DocumentUri, text: impl Into<Arc<str>>, version: i32) -> bool {
        let mut buffers = self.buffers.lock();
        let Some(buffer) = buffers.get_mut(uri) else {
            return false;
        };
        buffer.text = text.into();
        buffer.version = version;
        buffer.saved = false;
        true
    }

    /// Marks an open buffer as saved. Returns false if it is not open.
    pub fn save(&self, uri: &DocumentUri) -> bool {
        let mut buffers = self.buffers.lock();
        let Some(buffer) = buffers.get_mut(uri) else {
            return false;
        };
        buffer.saved = true;
        true
    }

    pub fn close(&self, uri: &DocumentUri) -> bool {
        self.buffers.lock().remove(uri).is_some()
    }

    pub fn is_open(&self, uri: &DocumentUri) -> bool {
        self.buffers.lock().contains_key(uri)
    }

    /// Every open buffer as a handle.
    pub fn overlays(&self) -> Vec<FileHandle> {
        self.buffers
            .lock()
            .iter()
            .map(|(uri, b)| FileHandle::overlay(uri.clone(), b.text.clone(), b.version, b.saved))
            .collect()
    }
}

impl<S: FileSource> FileSource for OverlaySource<S> {
    fn read_file(&self, uri: &DocumentUri) -> Result<FileHandle, ReadError> {
        let buffer = self.buffers.lock().get(uri).cloned();
        match buffer {
            Some(b) => Ok(FileHandle::overlay(uri.clone(), b.text, b.version, b.saved)),
            None => self.base.read_file(uri),
        }
    }
}
