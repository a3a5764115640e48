//! On-disk representation of one cache entry.
//!
//! An entry file holds a bincode envelope that repeats the entry's kind and
//! key next to the payload. Readers treat anything they cannot fully trust
//! as a miss and delete it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bincode::Options;
use serde::{Deserialize, Serialize};
use strata_core::{Fingerprint, STRATA_VERSION};

use crate::error::{CacheError, Result};
use crate::ArtifactKind;

pub const ARTIFACT_CACHE_SCHEMA_VERSION: u32 = 1;

/// Largest entry file we are willing to read back.
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema_version: u32,
    strata_version: &'a str,
    kind: ArtifactKind,
    key: Fingerprint,
    bytes: &'a [u8],
}

#[derive(Deserialize)]
struct Envelope {
    schema_version: u32,
    strata_version: String,
    kind: ArtifactKind,
    key: Fingerprint,
    bytes: Vec<u8>,
}

fn codec() -> impl Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_ENTRY_BYTES)
}

pub(crate) fn encode(kind: ArtifactKind, key: &Fingerprint, bytes: &[u8]) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        schema_version: ARTIFACT_CACHE_SCHEMA_VERSION,
        strata_version: STRATA_VERSION,
        kind,
        key: *key,
        bytes,
    };
    Ok(codec().serialize(&envelope)?)
}

/// Decodes an entry file, checking that it belongs at `(kind, key)` and was
/// written by this version.
pub(crate) fn decode(kind: ArtifactKind, key: &Fingerprint, raw: &[u8]) -> Result<Vec<u8>> {
    let envelope: Envelope = codec().deserialize(raw)?;
    if envelope.schema_version != ARTIFACT_CACHE_SCHEMA_VERSION
        || envelope.strata_version != STRATA_VERSION
    {
        return Err(CacheError::IncompatibleSchemaVersion {
            expected: ARTIFACT_CACHE_SCHEMA_VERSION,
            found: envelope.schema_version,
        });
    }
    if envelope.kind != kind || envelope.key != *key {
        return Err(CacheError::Misplaced {
            kind: kind.as_str(),
            key: key.short(),
        });
    }
    Ok(envelope.bytes)
}

/// Reads the raw entry file at `path`. Absent, oversized, or non-regular
/// files read as `None`; the latter two are removed.
pub(crate) fn read(path: &Path) -> Option<Vec<u8>> {
    let len = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => {
            discard(path, "not a regular file");
            return None;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::debug!(target = "strata.cache", path = %path.display(), error = %err, "stat failed");
            return None;
        }
    };
    if len > MAX_ENTRY_BYTES {
        discard(path, "oversized");
        return None;
    }
    fs::read(path)
        .map_err(|err| {
            tracing::debug!(target = "strata.cache", path = %path.display(), error = %err, "read failed");
        })
        .ok()
}

/// Removes `path`, logging but otherwise ignoring failures.
pub(crate) fn discard(path: &Path, reason: &'static str) {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(target = "strata.cache", path = %path.display(), reason, "entry discarded");
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            tracing::debug!(
                target = "strata.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to discard entry"
            );
        }
    }
}

static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// Replaces the entry at `path` with `raw`.
///
/// The bytes are staged in a sibling file and renamed into place, so
/// concurrent readers see either the previous entry or the complete new one.
pub(crate) fn write(path: &Path, raw: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("cache entry path has no parent"))?;
    fs::create_dir_all(dir)?;

    let (staging, mut file) = create_staging(path, dir)?;
    let staged = file.write_all(raw).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = staged.and_then(|()| fs::rename(&staging, path)) {
        discard(&staging, "staging failed");
        return Err(err.into());
    }
    Ok(())
}

fn create_staging(path: &Path, dir: &Path) -> io::Result<(PathBuf, File)> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other("cache entry path has no file name"))?
        .to_string_lossy();
    let pid = std::process::id();
    loop {
        let id = NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed);
        let staging = dir.join(format!(".{name}.{pid}.{id}.staging"));
        match OpenOptions::new().write(true).create_new(true).open(&staging) {
            Ok(file) => return Ok((staging, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
}
