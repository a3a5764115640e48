use std::sync::Arc;

use strata_core::UnitId;
use strata_metadata::{UnitError, UnitMetadata};
use strata_vfs::FileAction;
use strata_workspace::{CancellationToken, LoadScope, Validity};

use super::support::{id, uri, Harness};

fn ids(values: &[&str]) -> Vec<UnitId> {
    values.iter().map(|value| id(value)).collect()
}

#[tokio::test]
async fn body_edit_downgrades_only_the_edited_unit() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;

    let (after, needs_diagnosis) = harness.disk_edit("/ws/d/d.src", "unit d\nfn main() {}\n");

    assert!(needs_diagnosis);
    assert!(Arc::ptr_eq(&before.metadata_graph(), &after.metadata_graph()));
    assert!(Arc::ptr_eq(&before.workspace_units(), &after.workspace_units()));
    assert_eq!(after.unit_validity(&id("ws/d")), Some(Validity::ValidMetadataOnly));
    for unit in ["ws/a", "ws/b", "ws/c"] {
        let old = before.cached_unit_handle(&id(unit)).unwrap();
        let new = after.cached_unit_handle(&id(unit)).unwrap();
        assert!(Arc::ptr_eq(&old, &new), "{unit} should be shared");
    }
    // The predecessor is untouched.
    assert_eq!(before.unit_validity(&id("ws/d")), Some(Validity::FullyValid));
}

#[tokio::test]
async fn body_edit_downgrades_importers_transitively() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let before_keys: Vec<_> = ids(&["ws/a", "ws/b", "ws/c", "ws/d"])
        .iter()
        .map(|unit| before.unit_handle(unit).unwrap().key())
        .collect();

    let (after, _) = harness.disk_edit("/ws/a/a.src", "unit a\nfn helper() {}\n");

    for unit in ["ws/a", "ws/b", "ws/c"] {
        assert_eq!(
            after.unit_validity(&id(unit)),
            Some(Validity::ValidMetadataOnly),
            "{unit}"
        );
    }
    assert_eq!(after.unit_validity(&id("ws/d")), Some(Validity::FullyValid));

    // Rebuilt keys change along the import chain and nowhere else.
    let after_keys: Vec<_> = ids(&["ws/a", "ws/b", "ws/c", "ws/d"])
        .iter()
        .map(|unit| after.unit_handle(unit).unwrap().key())
        .collect();
    assert_ne!(before_keys[0], after_keys[0]);
    assert_ne!(before_keys[1], after_keys[1]);
    assert_ne!(before_keys[2], after_keys[2]);
    assert_eq!(before_keys[3], after_keys[3]);
    assert_eq!(after.unit_validity(&id("ws/c")), Some(Validity::FullyValid));
}

#[tokio::test]
async fn validity_never_rises_across_a_clone() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let edits = [
        ("/ws/a/a.src", "unit a\n// touched\n"),
        ("/ws/b/b.src", "unit b\n"),
        ("/ws/d/d.src", "unit dd\n"),
    ];
    let mut previous = before;
    for (path, text) in edits {
        let (next, _) = harness.disk_edit(path, text);
        for unit in ["ws/a", "ws/b", "ws/c", "ws/d"] {
            let old = previous.unit_validity(&id(unit));
            let new = next.unit_validity(&id(unit));
            assert!(new <= old, "{unit} rose from {old:?} to {new:?} after editing {path}");
        }
        previous = next;
    }
}

#[tokio::test]
async fn removed_import_drops_metadata_of_unit_and_importers() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;

    let (after, needs_diagnosis) = harness.disk_edit("/ws/b/b.src", "unit b\n");

    assert!(needs_diagnosis);
    assert!(after.metadata(&id("ws/b")).is_none());
    assert!(after.metadata(&id("ws/c")).is_none());
    assert!(after.metadata(&id("ws/a")).is_some());
    assert!(after.cached_unit_handle(&id("ws/b")).is_none());
    assert!(after.cached_unit_handle(&id("ws/c")).is_none());
    assert_eq!(after.pending_reloads(), ids(&["ws/b", "ws/c"]));
    assert!(!Arc::ptr_eq(&before.metadata_graph(), &after.metadata_graph()));
    assert!(!after.is_workspace_unit(&id("ws/b")));

    // The loader now reports the edited unit without the import.
    harness
        .loader
        .put(UnitMetadata::new("ws/b", "ws/b").with_files([uri("/ws/b/b.src")]));
    harness.loader.put(
        UnitMetadata::new("ws/c", "ws/c")
            .with_files([uri("/ws/c/c.src")])
            .with_dep("ws/b", Some(id("ws/b"))),
    );
    let token = CancellationToken::new();
    after.await_loaded(&token).await.unwrap();

    assert!(after.pending_reloads().is_empty());
    let b = after.metadata(&id("ws/b")).unwrap();
    assert!(b.deps_by_path.is_empty());
    assert!(after.metadata(&id("ws/c")).is_some());
    assert!(after.is_workspace_unit(&id("ws/b")));
    let last = harness.loader.calls().pop().unwrap();
    assert_eq!(
        last,
        vec![
            LoadScope::Path("ws/b".into()),
            LoadScope::Path("ws/c".into())
        ]
    );
}

#[tokio::test]
async fn deleting_an_import_retries_units_with_errors() {
    let harness = Harness::new();
    harness.unit(
        "ws/x",
        &[("/ws/x/x.src", "unit x\nimport \"ws/y\"\n")],
        &["ws/y"],
    );
    harness.loader.put(
        UnitMetadata::new("ws/y", "ws/y")
            .with_files([uri("/ws/y/y.src")])
            .with_dep("ws/x", Some(id("ws/x")))
            .with_error(UnitError::new("import cycle not allowed")),
    );
    harness
        .source
        .set("/ws/y/y.src", "unit y\nimport \"ws/x\"\n");
    harness.unit("ws/z", &[("/ws/z/z.src", "unit z\n")], &[]);
    let snapshot = harness.loaded().await;
    // Building handles over the cycle terminates; the back edge is dropped.
    assert!(snapshot.unit_handle(&id("ws/y")).is_ok());
    assert!(snapshot.unit_handle(&id("ws/x")).is_ok());

    let (after, _) = harness.disk_edit("/ws/y/y.src", "unit y\n");
    assert!(after.metadata(&id("ws/y")).is_none());
    assert!(after.metadata(&id("ws/x")).is_none());
    assert!(after.metadata(&id("ws/z")).is_some());

    harness
        .loader
        .put(UnitMetadata::new("ws/y", "ws/y").with_files([uri("/ws/y/y.src")]));
    let token = CancellationToken::new();
    after.await_loaded(&token).await.unwrap();
    let y = after.metadata(&id("ws/y")).unwrap();
    assert!(y.errors.is_empty());
    assert!(after.unit_handle(&id("ws/x")).is_ok());
}

#[tokio::test]
async fn new_file_is_attributed_to_units_in_its_directory() {
    let temp = tempfile::tempdir().unwrap();
    for dir in ["a", "d"] {
        std::fs::create_dir_all(temp.path().join(dir)).unwrap();
    }
    let path = |rel: &str| temp.path().join(rel).to_string_lossy().into_owned();
    let harness = Harness::new();
    harness.unit("ws/a", &[(path("a/a.src").as_str(), "unit a\n")], &[]);
    harness.unit("ws/d", &[(path("d/d.src").as_str(), "unit d\n")], &[]);
    harness.loaded().await;

    let extra = path("a/extra.src");
    harness.source.set(&extra, "unit a\n");
    let (after, needs_diagnosis) = harness.disk_event(&extra, FileAction::Create);

    assert!(needs_diagnosis);
    assert!(after.metadata(&id("ws/a")).is_none());
    assert!(after.metadata(&id("ws/d")).is_some());
    assert!(after.pending_reloads().contains(&id("ws/a")));
}

#[tokio::test]
async fn new_file_in_an_uninspectable_directory_invalidates_nothing() {
    let harness = Harness::with_chain();
    harness.loaded().await;

    harness.source.set("/ws/a/extra.src", "unit a\n");
    let (after, _) = harness.disk_event("/ws/a/extra.src", FileAction::Create);

    assert!(after.metadata(&id("ws/a")).is_some());
    assert!(after.pending_reloads().is_empty());
}

#[tokio::test]
async fn new_file_retries_units_with_unresolved_imports() {
    let harness = Harness::with_chain();
    harness.loader.put(
        UnitMetadata::new("ws/e", "ws/e")
            .with_files([uri("/ws/e/e.src")])
            .with_dep("ws/missing", None),
    );
    harness
        .source
        .set("/ws/e/e.src", "unit e\nimport \"ws/missing\"\n");
    harness.loaded().await;

    harness.source.set("/ws/missing/m.src", "unit missing\n");
    let (after, _) = harness.disk_event("/ws/missing/m.src", FileAction::Create);
    assert!(after.metadata(&id("ws/e")).is_none());
    assert!(after.metadata(&id("ws/a")).is_some());
}

#[tokio::test]
async fn saving_the_workspace_file_reinitializes() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let loads = harness.loader.call_count();

    harness.source.set("/ws/strata.work", "use ./a\n");
    let (after, needs_diagnosis) = harness.disk_event("/ws/strata.work", FileAction::Change);

    assert!(needs_diagnosis);
    assert!(after.metadata_graph().is_empty());
    assert_eq!(after.pending_reloads().len(), 4);
    assert!(before.metadata_graph().len() == 4);

    let token = CancellationToken::new();
    after.await_loaded(&token).await.unwrap();
    assert_eq!(after.metadata_graph().len(), 4);
    assert!(after.pending_reloads().is_empty());
    let calls = harness.loader.calls();
    assert_eq!(calls.len(), loads + 1);
    assert_eq!(calls[loads], vec![LoadScope::Workspace]);
}

#[tokio::test]
async fn vendor_tree_changes_reinitialize() {
    let harness = Harness::with_chain();
    harness.loaded().await;

    harness.source.set("/ws/vendor/lib/lib.src", "unit lib\n");
    let (after, _) = harness.disk_event("/ws/vendor/lib/lib.src", FileAction::Create);
    assert!(after.metadata_graph().is_empty());
}

#[tokio::test]
async fn comment_edit_keeps_metadata() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let (after, _) = harness.disk_edit("/ws/b/b.src", "// about b\nunit b\nimport \"ws/a\"\n");
    assert!(Arc::ptr_eq(&before.metadata_graph(), &after.metadata_graph()));
    assert!(after.pending_reloads().is_empty());
}

#[tokio::test]
async fn magic_comment_edit_invalidates_metadata() {
    let harness = Harness::with_chain();
    harness.loaded().await;
    let (after, _) = harness.disk_edit("/ws/d/d.src", "//build: linux\nunit d\n");
    assert!(after.metadata(&id("ws/d")).is_none());
}

#[tokio::test]
async fn analysis_keys_are_cleared_for_invalidated_units() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let a_full = before.analysis_key(&id("ws/a"), false).unwrap();
    let a_facts = before.analysis_key(&id("ws/a"), true).unwrap();
    let d_full = before.analysis_key(&id("ws/d"), false).unwrap();
    assert_ne!(a_full, a_facts);

    let (after, _) = harness.disk_edit("/ws/a/a.src", "unit a\nfn helper() {}\n");
    assert_ne!(after.analysis_key(&id("ws/a"), false).unwrap(), a_full);
    assert_eq!(after.analysis_key(&id("ws/d"), false).unwrap(), d_full);
}
