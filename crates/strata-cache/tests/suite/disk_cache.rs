use std::fs;

use strata_cache::{ArtifactCache, ArtifactKind, DiskArtifactCache};
use strata_core::Fingerprint;

fn entry_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

#[test]
fn disk_cache_round_trips_by_kind_and_key() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskArtifactCache::new(tmp.path()).unwrap();
    let key = Fingerprint::from_bytes("unit a");

    assert_eq!(cache.get(ArtifactKind::Diagnostics, &key).unwrap(), None);
    cache.set(ArtifactKind::Diagnostics, &key, b"diags").unwrap();
    assert_eq!(
        cache.get(ArtifactKind::Diagnostics, &key).unwrap().as_deref(),
        Some(b"diags".as_slice())
    );
    assert_eq!(cache.get(ArtifactKind::Xrefs, &key).unwrap(), None);

    let files = entry_files(tmp.path());
    assert_eq!(files.len(), 1);
    let hex = key.to_hex();
    assert!(files[0].ends_with(format!("diagnostics/{}/{hex}.bin", &hex[..2])));
}

#[test]
fn corrupt_entry_is_a_miss_and_is_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskArtifactCache::new(tmp.path()).unwrap();
    let key = Fingerprint::from_bytes("unit b");
    cache.set(ArtifactKind::Tests, &key, b"tests").unwrap();

    let path = entry_files(tmp.path()).pop().unwrap();
    fs::write(&path, b"\xff\xff garbage").unwrap();

    assert_eq!(cache.get(ArtifactKind::Tests, &key).unwrap(), None);
    assert!(!path.exists());
}

#[test]
fn misplaced_entry_is_not_served_for_another_key() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = DiskArtifactCache::new(tmp.path()).unwrap();
    let a = Fingerprint::from_bytes("a");
    let b = Fingerprint::from_bytes("b");
    cache.set(ArtifactKind::MethodSets, &a, b"a-sets").unwrap();

    let a_path = entry_files(tmp.path()).pop().unwrap();
    let b_hex = b.to_hex();
    let b_path = tmp
        .path()
        .join("methodsets")
        .join(&b_hex[..2])
        .join(format!("{b_hex}.bin"));
    fs::create_dir_all(b_path.parent().unwrap()).unwrap();
    fs::copy(&a_path, &b_path).unwrap();

    assert_eq!(cache.get(ArtifactKind::MethodSets, &b).unwrap(), None);
    assert!(cache.get(ArtifactKind::MethodSets, &a).unwrap().is_some());
}
