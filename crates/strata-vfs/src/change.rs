use std::collections::BTreeMap;

use strata_core::DocumentUri;

use crate::handle::{was_saved, FileHandle};

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAction {
    Open,
    Change,
    Close,
    Save,
    Create,
    Delete,
}

/// A single editor or file-system event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub uri: DocumentUri,
    pub action: FileAction,
    /// The event was observed on disk rather than reported by the editor.
    pub on_disk: bool,
    /// Buffer version for editor events.
    pub version: i32,
    /// Full buffer text for `Open` and `Change`.
    pub text: Option<String>,
    pub language_id: Option<String>,
}

impl Modification {
    pub fn new(uri: DocumentUri, action: FileAction) -> Self {
        Self {
            uri,
            action,
            on_disk: false,
            version: 0,
            text: None,
            language_id: None,
        }
    }

    pub fn on_disk(uri: DocumentUri, action: FileAction) -> Self {
        Self {
            on_disk: true,
            ..Self::new(uri, action)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>, version: i32) -> Self {
        self.text = Some(text.into());
        self.version = version;
        self
    }
}

/// A batch of changes applied to a snapshot in one clone.
#[derive(Debug, Clone, Default)]
pub struct StateChange {
    pub modifications: Vec<Modification>,
    /// The new handle for every changed URI.
    pub files: BTreeMap<DocumentUri, FileHandle>,
    /// Directories whose "want compiler optimization details" flag changed.
    pub compiler_opt_details: BTreeMap<DocumentUri, bool>,
}

impl StateChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
            && self.files.is_empty()
            && self.compiler_opt_details.is_empty()
    }

    /// Records `handle` as the new version of its URI.
    pub fn with_file(mut self, handle: FileHandle) -> Self {
        self.files.insert(handle.uri().clone(), handle);
        self
    }

    pub fn with_modification(mut self, modification: Modification) -> Self {
        self.modifications.push(modification);
        self
    }

    pub fn with_compiler_opt_details(mut self, dir: DocumentUri, want: bool) -> Self {
        self.compiler_opt_details.insert(dir, want);
        self
    }
}

/// Reports whether the change from `old` to `new` counts as a save.
pub fn file_was_saved(old: Option<&FileHandle>, new: &FileHandle) -> bool {
    was_saved(old, new)
}

/// Reports whether `new` may differ from `old` on disk.
///
/// Over-approximates: true when `new` matches disk and either `old` did not
/// exist, did not match disk, or had different content.
pub fn changed_on_disk(old: Option<&FileHandle>, new: &FileHandle) -> bool {
    if !new.same_contents_on_disk() {
        return false;
    }
    let old_exists = old.is_some_and(FileHandle::exists);
    let new_exists = new.exists();
    if !old_exists || !new_exists {
        return old_exists != new_exists;
    }
    match old {
        Some(old) => !old.same_contents_on_disk() || old.identity() != new.identity(),
        None => true,
    }
}
