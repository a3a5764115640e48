use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use strata_cache::{ArtifactCache, MemoryArtifactCache};
use strata_config::StrataConfig;
use strata_vfs::{FileAction, Modification};
use strata_workspace::{ArtifactKind, CancellationToken, Error};

use super::support::{id, uri, Harness};

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[tokio::test]
async fn concurrent_queries_share_one_check() {
    let harness = Harness::with_chain();
    harness.checker.set_delay(Duration::from_millis(20));
    let snapshot = harness.loaded().await;

    let tokens: Vec<CancellationToken> = (0..8).map(|_| CancellationToken::new()).collect();
    let ids = [id("ws/a")];
    let results = join_all(
        tokens
            .iter()
            .map(|token| snapshot.unit_diagnostics(&ids, token)),
    )
    .await;
    for result in results {
        assert_eq!(result.unwrap().len(), 1);
    }
    assert_eq!(harness.checker.checks("ws/a"), 1);
}

#[tokio::test]
async fn one_check_serves_every_artifact_kind() {
    let harness = Harness::with_chain();
    let snapshot = harness.loaded().await;
    let token = CancellationToken::new();
    let b = [id("ws/b")];

    let diagnostics = snapshot.unit_diagnostics(&b, &token).await.unwrap();
    let xrefs = snapshot.references(&b, &token).await.unwrap();
    let methods = snapshot.method_sets(&b, &token).await.unwrap();
    let tests = snapshot.tests(&b, &token).await.unwrap();

    assert_eq!(harness.checker.total(), 1);
    assert_eq!(xrefs[0].unit, id("ws/b"));
    assert_eq!(xrefs[0].kind, ArtifactKind::Xrefs);
    for (artifacts, kind) in [
        (&diagnostics, ArtifactKind::Diagnostics),
        (&xrefs, ArtifactKind::Xrefs),
        (&methods, ArtifactKind::MethodSets),
        (&tests, ArtifactKind::Tests),
    ] {
        let expected = format!("{}:ws/b:1:", kind.as_str());
        assert!(text(&artifacts[0].bytes).starts_with(&expected), "{kind:?}");
    }
}

#[tokio::test]
async fn edit_rechecks_only_affected_units() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let token = CancellationToken::new();
    let ids = [id("ws/a"), id("ws/c"), id("ws/d")];
    before.unit_diagnostics(&ids, &token).await.unwrap();

    let (after, _) = harness.disk_edit("/ws/d/d.src", "unit d\nfn main() {}\n");
    let artifacts = after.unit_diagnostics(&ids, &token).await.unwrap();

    assert_eq!(harness.checker.checks("ws/a"), 1);
    assert_eq!(harness.checker.checks("ws/c"), 1);
    assert_eq!(harness.checker.checks("ws/d"), 2);
    let d = text(&artifacts[2].bytes);
    assert!(d.ends_with(&"unit d\nfn main() {}\n".len().to_string()), "{d}");
}

#[tokio::test]
async fn dependency_edit_rechecks_importers() {
    let harness = Harness::with_chain();
    let before = harness.loaded().await;
    let token = CancellationToken::new();
    before.unit_diagnostics(&[id("ws/c")], &token).await.unwrap();

    let (after, _) = harness.disk_edit("/ws/a/a.src", "unit a\nfn helper() {}\n");
    after.unit_diagnostics(&[id("ws/c")], &token).await.unwrap();
    assert_eq!(harness.checker.checks("ws/c"), 2);
    assert_eq!(harness.checker.checks("ws/a"), 0);
}

#[tokio::test]
async fn artifacts_are_served_from_a_shared_cache() {
    let cache: Arc<dyn ArtifactCache> = Arc::new(MemoryArtifactCache::new());
    let first = Harness::with_chain_and(|c| c.with_artifact_cache(Arc::clone(&cache)));
    let second = Harness::with_chain_and(|c| c.with_artifact_cache(Arc::clone(&cache)));
    let token = CancellationToken::new();

    let from_check = first
        .loaded()
        .await
        .references(&[id("ws/b")], &token)
        .await
        .unwrap();
    let from_cache = second
        .loaded()
        .await
        .references(&[id("ws/b")], &token)
        .await
        .unwrap();

    assert_eq!(first.checker.total(), 1);
    assert_eq!(second.checker.total(), 0);
    assert_eq!(from_check, from_cache);
}

#[tokio::test]
async fn configured_cache_dir_persists_artifacts() {
    let temp = tempfile::tempdir().unwrap();
    let config = || {
        let mut config = StrataConfig::default();
        config.cache.dir = Some(temp.path().to_path_buf());
        config
    };
    let token = CancellationToken::new();

    let first = Harness::build(config(), |c| c);
    first.add_chain();
    first
        .loaded()
        .await
        .unit_diagnostics(&[id("ws/d")], &token)
        .await
        .unwrap();
    first.workspace.shutdown();

    let second = Harness::build(config(), |c| c);
    second.add_chain();
    let artifacts = second
        .loaded()
        .await
        .unit_diagnostics(&[id("ws/d")], &token)
        .await
        .unwrap();
    assert_eq!(second.checker.total(), 0);
    assert!(text(&artifacts[0].bytes).contains("ws/d"));
}

#[tokio::test]
async fn check_failures_surface_per_unit() {
    let harness = Harness::with_chain();
    harness.checker.fail_on("ws/d");
    let snapshot = harness.loaded().await;
    let token = CancellationToken::new();

    let err = snapshot
        .unit_diagnostics(&[id("ws/d")], &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Check(_)), "{err}");
    assert!(err.to_string().contains("syntax error"), "{err}");
    assert!(snapshot.unit_diagnostics(&[id("ws/a")], &token).await.is_ok());
    assert!(matches!(
        snapshot.unit_diagnostics(&[id("ws/missing")], &token).await,
        Err(Error::UnknownUnit(_))
    ));
}

#[tokio::test]
async fn abandoned_check_restarts_for_the_next_caller() {
    let harness = Harness::with_chain();
    harness.checker.set_delay(Duration::from_millis(50));
    let snapshot = harness.loaded().await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    let a = [id("ws/a")];
    let (outcome, _) = tokio::join!(snapshot.unit_diagnostics(&a, &token), async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        canceller.cancel();
    });
    assert!(matches!(outcome, Err(Error::Cancelled)));

    let token = CancellationToken::new();
    snapshot
        .unit_diagnostics(&[id("ws/a")], &token)
        .await
        .unwrap();
    assert_eq!(harness.checker.checks("ws/a"), 2);
}

#[tokio::test]
async fn tool_results_are_reused_until_a_file_below_is_saved() {
    let harness = Harness::with_chain();
    harness.loaded().await;
    let manifest = uri("/ws/strata.mod");
    let edited = uri("/ws/d/d.src");
    let runs = Arc::new(AtomicUsize::new(0));
    let tool = || {
        let runs = Arc::clone(&runs);
        move |_cancel: CancellationToken| {
            let runs = Arc::clone(&runs);
            async move {
                let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, anyhow::Error>(format!("run {n}").into_bytes())
            }
        }
    };
    let token = CancellationToken::new();
    let modify = |modification: Modification| {
        harness
            .workspace
            .did_modify_files(vec![modification])
            .unwrap()
            .0
    };

    let opened =
        modify(Modification::new(edited.clone(), FileAction::Open).with_text("unit d\n", 1));
    let out = opened.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(&*out, b"run 1");
    opened.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Unsaved body edits below the manifest keep the result.
    let dirty = modify(
        Modification::new(edited.clone(), FileAction::Change)
            .with_text("unit d\nfn f() {}\n", 2),
    );
    dirty.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Saving the buffer evicts it.
    let saved = modify(Modification::new(edited, FileAction::Save));
    let out = saved.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(&*out, b"run 2");

    // So does any on-disk write below the manifest, even a body-only one.
    let (on_disk, _) =
        harness.disk_edit("/ws/c/c.src", "unit c\nimport \"ws/b\"\nfn g() {}\n");
    let out = on_disk.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(&*out, b"run 3");

    // Files outside the manifest's directory leave it alone.
    let (outside, _) = harness.disk_edit("/elsewhere/x.src", "unit x\n");
    outside.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    // Older snapshots keep their own result.
    let out = dirty.tool_result(&manifest, &token, tool()).await.unwrap();
    assert_eq!(&*out, b"run 1");
}

#[tokio::test]
async fn failed_tool_run_is_reported() {
    let harness = Harness::new();
    let snapshot = harness.snapshot();
    let token = CancellationToken::new();
    let err = snapshot
        .tool_result(&uri("/ws/strata.mod"), &token, |_| async {
            Err::<Vec<u8>, _>(anyhow::anyhow!("tool not installed"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tool(_)), "{err}");
}
