use std::fs;
use std::io;
use std::sync::Arc;

use strata_core::DocumentUri;

use crate::handle::FileHandle;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("failed to read {uri}: {source}")]
    Io {
        uri: DocumentUri,
        #[source]
        source: io::Error,
    },
}

/// Source of file content for snapshots.
///
/// A file that does not exist is not an error: implementations return a
/// handle whose [`FileHandle::exists`] is false. Any other failure is
/// reported as a [`ReadError`]. Implementations must tolerate concurrent calls.
pub trait FileSource: Send + Sync {
    fn read_file(&self, uri: &DocumentUri) -> Result<FileHandle, ReadError>;
}

impl<T: FileSource + ?Sized> FileSource for Arc<T> {
    fn read_file(&self, uri: &DocumentUri) -> Result<FileHandle, ReadError> {
        (**self).read_file(uri)
    }
}

/// Reads `file://` URIs from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSource;

impl DiskSource {
    pub fn new() -> Self {
        Self
    }
}

impl FileSource for DiskSource {
    fn read_file(&self, uri: &DocumentUri) -> Result<FileHandle, ReadError> {
        match fs::read(uri.path()) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok(FileHandle::on_disk(uri.clone(), text))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Ok(FileHandle::missing(uri.clone()))
            }
            Err(source) => {
                tracing::debug!(target = "strata.vfs", %uri, error = %source, "read failed");
                Err(ReadError::Io {
                    uri: uri.clone(),
                    source,
                })
            }
        }
    }
}
