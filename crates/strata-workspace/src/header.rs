//! Cheap header parsing and metadata-change classification.
//!
//! Deciding whether an edit can change unit metadata must be fast, so only the
//! header of a file (its unit clause and imports) is parsed. The whole file is
//! scanned for magic comments only when the header comparison finds nothing.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use strata_core::Fingerprint;
use strata_vfs::FileHandle;

/// The metadata-relevant prefix of a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// The declared unit name, empty when the clause is missing.
    pub unit_name: String,
    /// Import paths in declaration order, unquoted.
    pub imports: Vec<String>,
    /// Set when the header is malformed. The fields above hold whatever could
    /// be recovered.
    pub parse_error: Option<String>,
}

impl FileHeader {
    /// Imports that could name a real unit.
    pub fn valid_imports(&self) -> BTreeSet<&str> {
        self.imports
            .iter()
            .map(String::as_str)
            .filter(|path| !path.is_empty() && !path.ends_with('/'))
            .collect()
    }
}

/// Extracts headers and magic comments from source files.
pub trait HeaderParser: Send + Sync {
    /// Parses the header of `file`. An `Err` means no header could be
    /// produced at all (for instance, the file has no content).
    fn parse_header(&self, file: &FileHandle) -> anyhow::Result<FileHeader>;

    /// Every comment in `file` that affects metadata, in order.
    fn magic_comments(&self, file: &FileHandle) -> Vec<String>;
}

/// A line-oriented parser for the `unit`/`import` header syntax.
///
/// ```text
/// // leading comments are skipped
/// unit parser
///
/// import "strata/lexer"
/// import strata/ast;
/// ```
///
/// The header ends at the first line that is neither blank, a comment, nor an
/// import.
#[derive(Debug, Clone)]
pub struct SimpleHeaderParser {
    magic_prefixes: Vec<String>,
}

impl SimpleHeaderParser {
    pub fn new(magic_prefixes: Vec<String>) -> Self {
        Self { magic_prefixes }
    }
}

impl HeaderParser for SimpleHeaderParser {
    fn parse_header(&self, file: &FileHandle) -> anyhow::Result<FileHeader> {
        let Some(text) = file.content() else {
            anyhow::bail!("{} has no content", file.uri());
        };

        let mut header = FileHeader::default();
        let mut seen_clause = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if !seen_clause {
                seen_clause = true;
                match parse_unit_clause(line) {
                    Some(name) => header.unit_name = name.to_owned(),
                    None => {
                        header.parse_error = Some("expected unit clause".to_owned());
                        break;
                    }
                }
                continue;
            }
            let Some(rest) = line.strip_prefix("import ") else {
                break;
            };
            match parse_import_path(rest) {
                Ok(path) => header.imports.push(path.to_owned()),
                Err(message) => {
                    header.parse_error.get_or_insert(message);
                }
            }
        }
        if !seen_clause {
            header.parse_error = Some("missing unit clause".to_owned());
        }
        Ok(header)
    }

    fn magic_comments(&self, file: &FileHandle) -> Vec<String> {
        let Some(text) = file.content() else {
            return Vec::new();
        };
        text.lines()
            .map(str::trim)
            .filter(|line| self.magic_prefixes.iter().any(|p| line.starts_with(p.as_str())))
            .map(str::to_owned)
            .collect()
    }
}

fn parse_unit_clause(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("unit ")
        .or_else(|| line.strip_prefix("package "))?;
    let name = rest.trim().trim_end_matches(';').trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}

fn parse_import_path(rest: &str) -> Result<&str, String> {
    let rest = rest.trim().trim_end_matches(';').trim();
    if let Some(quoted) = rest.strip_prefix('"') {
        return quoted
            .strip_suffix('"')
            .filter(|inner| !inner.contains('"'))
            .ok_or_else(|| "unterminated import path".to_owned());
    }
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(format!("malformed import {rest:?}"));
    }
    Ok(rest)
}

type CachedHeader = Result<Arc<FileHeader>, Arc<str>>;

/// Memoizes parsed headers by content fingerprint.
pub struct HeaderCache {
    parser: Arc<dyn HeaderParser>,
    entries: Mutex<LruCache<Fingerprint, CachedHeader>>,
}

impl HeaderCache {
    pub fn new(parser: Arc<dyn HeaderParser>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            parser,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn parser(&self) -> &Arc<dyn HeaderParser> {
        &self.parser
    }

    pub fn header(&self, file: &FileHandle) -> CachedHeader {
        let key = file.fingerprint();
        if let Some(hit) = self.entries.lock().get(&key) {
            return hit.clone();
        }
        let parsed = self
            .parser
            .parse_header(file)
            .map(Arc::new)
            .map_err(|err| Arc::<str>::from(format!("{err:#}")));
        self.entries.lock().put(key, parsed.clone());
        parsed
    }
}

impl std::fmt::Debug for HeaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderCache")
            .field("len", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

/// How a file edit may affect unit metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataChange {
    /// Metadata of the units containing the file must be reloaded.
    pub invalidate: bool,
    /// The file -> unit association may have changed (file created or
    /// deleted, or its unit name changed).
    pub unit_file_changed: bool,
    /// An import may have been removed. Conservative: may be set when nothing
    /// was actually removed.
    pub import_deleted: bool,
}

impl MetadataChange {
    const NONE: MetadataChange = MetadataChange {
        invalidate: false,
        unit_file_changed: false,
        import_deleted: false,
    };

    const ALL: MetadataChange = MetadataChange {
        invalidate: true,
        unit_file_changed: true,
        import_deleted: true,
    };
}

/// Classifies the change from `old` (if previously observed) to `new`.
pub fn metadata_changes(
    headers: &HeaderCache,
    old: Option<&FileHandle>,
    new: &FileHandle,
) -> MetadataChange {
    let old_exists = old.is_some_and(FileHandle::exists);
    let new_exists = new.exists();
    let (Some(old), true, true) = (old, old_exists, new_exists) else {
        let changed = old_exists != new_exists;
        return MetadataChange {
            invalidate: changed,
            unit_file_changed: changed,
            import_deleted: !new_exists,
        };
    };

    if old.identity() == new.identity() {
        return MetadataChange::NONE;
    }

    let (old_header, new_header) = match (headers.header(old), headers.header(new)) {
        (Ok(old_header), Ok(new_header)) => (old_header, new_header),
        (old_header, new_header) => {
            let err_changed = old_header.is_ok() != new_header.is_ok();
            return MetadataChange {
                invalidate: err_changed,
                unit_file_changed: err_changed,
                import_deleted: new_header.is_err(),
            };
        }
    };

    // A header that starts parsing again may change anything.
    if old_header.parse_error.is_some() && new_header.parse_error.is_none() {
        return MetadataChange::ALL;
    }
    if old_header.unit_name != new_header.unit_name {
        return MetadataChange::ALL;
    }

    let mut change = MetadataChange::NONE;
    let mut old_imports = old_header.valid_imports();
    for path in new_header.valid_imports() {
        if !old_imports.remove(path) {
            change.invalidate = true;
        }
    }
    if !old_imports.is_empty() {
        change.invalidate = true;
        change.import_deleted = true;
    }

    if !change.invalidate {
        let parser = headers.parser();
        change.invalidate = parser.magic_comments(old) != parser.magic_comments(new);
    }
    change
}
