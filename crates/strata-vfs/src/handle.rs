use std::fmt;
use std::sync::Arc;

use strata_core::{DocumentUri, Fingerprint};

/// Where a handle's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Disk,
    /// An editor buffer. `saved` is true when the buffer matches disk.
    Overlay { version: i32, saved: bool },
}

/// The content identity of a handle: two handles with equal identities have
/// equal content and the same existence state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub uri: DocumentUri,
    pub fingerprint: Fingerprint,
    pub exists: bool,
    /// The read failed for a reason other than non-existence.
    pub unreadable: bool,
}

/// One observed version of a file.
///
/// Handles are immutable; changing a file means replacing its handle in the
/// [`crate::FileMap`]. Cloning is a reference count bump.
#[derive(Clone)]
pub struct FileHandle {
    inner: Arc<HandleData>,
}

struct HandleData {
    uri: DocumentUri,
    fingerprint: Fingerprint,
    content: Option<Arc<str>>,
    kind: FileKind,
    read_error: Option<Arc<str>>,
}

impl FileHandle {
    fn build(
        uri: DocumentUri,
        content: Option<Arc<str>>,
        kind: FileKind,
        read_error: Option<Arc<str>>,
    ) -> Self {
        let fingerprint = match &content {
            Some(text) => Fingerprint::from_bytes(text.as_bytes()),
            None => Fingerprint::of_missing(),
        };
        Self {
            inner: Arc::new(HandleData {
                uri,
                fingerprint,
                content,
                kind,
                read_error,
            }),
        }
    }

    /// A file read from disk.
    pub fn on_disk(uri: DocumentUri, content: impl Into<Arc<str>>) -> Self {
        Self::build(uri, Some(content.into()), FileKind::Disk, None)
    }

    /// A file that does not exist on disk.
    pub fn missing(uri: DocumentUri) -> Self {
        Self::build(uri, None, FileKind::Disk, None)
    }

    /// A file whose read failed for a reason other than non-existence.
    pub fn failed(uri: DocumentUri, error: impl fmt::Display) -> Self {
        Self::build(uri, None, FileKind::Disk, Some(error.to_string().into()))
    }

    /// An editor buffer.
    pub fn overlay(
        uri: DocumentUri,
        content: impl Into<Arc<str>>,
        version: i32,
        saved: bool,
    ) -> Self {
        Self::build(
            uri,
            Some(content.into()),
            FileKind::Overlay { version, saved },
            None,
        )
    }

    pub fn uri(&self) -> &DocumentUri {
        &self.inner.uri
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.inner.fingerprint
    }

    pub fn content(&self) -> Option<&str> {
        self.inner.content.as_deref()
    }

    pub fn kind(&self) -> FileKind {
        self.inner.kind
    }

    pub fn read_error(&self) -> Option<&str> {
        self.inner.read_error.as_deref()
    }

    /// Whether the file's content could be read.
    pub fn exists(&self) -> bool {
        self.inner.content.is_some() && self.inner.read_error.is_none()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.kind, FileKind::Overlay { .. })
    }

    pub fn version(&self) -> Option<i32> {
        match self.inner.kind {
            FileKind::Overlay { version, .. } => Some(version),
            FileKind::Disk => None,
        }
    }

    /// Whether the content of this handle matches the file on disk.
    pub fn same_contents_on_disk(&self) -> bool {
        match self.inner.kind {
            FileKind::Disk => true,
            FileKind::Overlay { saved, .. } => saved,
        }
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            uri: self.inner.uri.clone(),
            fingerprint: self.inner.fingerprint,
            exists: self.exists(),
            unreadable: self.inner.read_error.is_some(),
        }
    }

    /// Whether `self` and `other` are the same allocation.
    pub fn ptr_eq(&self, other: &FileHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Reports whether `current` represents a save relative to `previous`.
///
/// Disk handles always count as saved; an overlay counts once it flips from
/// unsaved to saved.
pub(crate) fn was_saved(previous: Option<&FileHandle>, current: &FileHandle) -> bool {
    let FileKind::Overlay { saved, .. } = current.kind() else {
        return true;
    };
    match previous.map(FileHandle::kind) {
        Some(FileKind::Overlay { saved: was, .. }) => !was && saved,
        _ => saved,
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("uri", &self.inner.uri)
            .field("fingerprint", &self.inner.fingerprint)
            .field("kind", &self.inner.kind)
            .field("exists", &self.exists())
            .finish()
    }
}
