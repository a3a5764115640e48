use std::collections::BTreeMap;

use strata_core::DocumentUri;
use strata_persistent::Map;

use crate::handle::FileHandle;

/// The persistent URI -> handle map of one snapshot.
///
/// Besides the files it maintains the set of open overlays and a refcounted
/// index of every ancestor directory of a known file. A file map is only
/// mutated by its owning snapshot, before publication or under that
/// snapshot's header lock.
#[derive(Clone, Default)]
pub struct FileMap {
    files: Map<DocumentUri, FileHandle>,
    overlays: Map<DocumentUri, FileHandle>,
    /// Directory path -> number of known files beneath it.
    dirs: Map<String, usize>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, uri: &DocumentUri) -> Option<&FileHandle> {
        self.files.get(uri)
    }

    /// Records `handle` for `uri`, replacing any previous handle.
    pub fn set(&mut self, uri: DocumentUri, handle: FileHandle) {
        if handle.is_open() {
            self.overlays.set(uri.clone(), handle.clone());
        } else {
            self.overlays.delete(&uri);
        }
        if self.files.set(uri.clone(), handle).is_none() {
            for dir in parent_dirs(uri.path()) {
                let count = self.dirs.get(&dir).copied().unwrap_or(0);
                self.dirs.set(dir, count + 1);
            }
        }
    }

    /// Forgets `uri`. Returns whether it was present.
    pub fn delete(&mut self, uri: &DocumentUri) -> bool {
        self.overlays.delete(uri);
        if !self.files.delete(uri) {
            return false;
        }
        for dir in parent_dirs(uri.path()) {
            match self.dirs.get(&dir).copied() {
                Some(count) if count > 1 => {
                    self.dirs.set(dir, count - 1);
                }
                Some(_) => {
                    self.dirs.delete(&dir);
                }
                None => {
                    strata_core::bug!("directory index missing {dir} for {uri}");
                }
            }
        }
        true
    }

    /// Returns a copy of this map with `changes` applied.
    ///
    /// Handles of files that no longer exist are dropped so the next read
    /// observes the file system again. Unchanged structure is shared.
    pub fn clone_with(&self, changes: &BTreeMap<DocumentUri, FileHandle>) -> FileMap {
        let mut next = self.clone();
        for (uri, handle) in changes {
            if handle.exists() {
                next.set(uri.clone(), handle.clone());
            } else {
                next.delete(uri);
            }
        }
        next
    }

    pub fn all(&self) -> impl Iterator<Item = (&DocumentUri, &FileHandle)> + '_ {
        self.files.iter()
    }

    pub fn overlays(&self) -> impl Iterator<Item = &FileHandle> + '_ {
        self.overlays.values()
    }

    /// Every ancestor directory of a known file, in path order.
    pub fn all_directories(&self) -> impl Iterator<Item = &str> + '_ {
        self.dirs.keys().map(String::as_str)
    }

    /// Whether any known file lies beneath `dir`.
    pub fn contains_dir(&self, dir: &str) -> bool {
        self.dirs.contains_key(&dir.to_owned())
    }

    /// Known files whose parent directory is exactly `dir`.
    pub fn files_in_dir<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a FileHandle> + 'a {
        let dir = dir.trim_end_matches('/');
        self.files
            .iter()
            .filter(move |(uri, _)| {
                let parent = uri.dir_path();
                parent == dir || (dir.is_empty() && parent == "/")
            })
            .map(|(_, fh)| fh)
    }

    /// Whether this map and `other` share all structure.
    pub fn ptr_eq(&self, other: &FileMap) -> bool {
        self.files.ptr_eq(&other.files)
    }

    pub fn destroy(&mut self) {
        self.files.destroy();
        self.overlays.destroy();
        self.dirs.destroy();
    }
}

/// Every ancestor directory of `path`, innermost first, ending with `/`.
fn parent_dirs(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(idx) = current.rfind('/') {
        if idx == 0 {
            out.push("/".to_owned());
            break;
        }
        current = &current[..idx];
        out.push(current.to_owned());
    }
    out
}
