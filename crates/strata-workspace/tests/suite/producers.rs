use futures::FutureExt;
use strata_vfs::FileHandle;
use strata_workspace::{CancellationToken, Error, ProducerRegistry, ProducerRequest};

use super::support::{uri, Harness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fix {
    OrganizeImports,
    Broken,
    RunTests,
    Rename,
}

fn is_source(fh: &FileHandle) -> bool {
    fh.uri().extension() == Some("src")
}

fn registry() -> ProducerRegistry<Fix, String> {
    ProducerRegistry::<Fix, String>::new()
        .register(Fix::OrganizeImports, true, is_source, |req: ProducerRequest<Fix>| {
            async move {
                let unit = req.unit.map(|unit| unit.id.to_string()).unwrap_or_default();
                Ok(vec![format!("organize imports in {unit}")])
            }
            .boxed()
        })
        .register(Fix::Broken, false, is_source, |_| {
            async { Err(anyhow::anyhow!("producer crashed")) }.boxed()
        })
        .register(Fix::RunTests, false, |_| true, |req: ProducerRequest<Fix>| {
            async move { Ok(vec![format!("run tests for {}", req.file.uri().base_name())]) }
                .boxed()
        })
        .register(Fix::Rename, true, is_source, |req: ProducerRequest<Fix>| {
            async move {
                let snapshot = req.snapshot.sequence_id();
                Ok(vec![format!("rename at {snapshot}")])
            }
            .boxed()
        })
}

#[tokio::test]
async fn producers_run_in_order_and_failures_are_skipped() {
    let harness = Harness::with_chain();
    let snapshot = harness.loaded().await;
    let token = CancellationToken::new();

    let out = registry()
        .run(&snapshot, &uri("/ws/a/a.src"), |_| true, &token)
        .await
        .unwrap();
    assert_eq!(
        out,
        vec![
            (Fix::OrganizeImports, "organize imports in ws/a".to_owned()),
            (Fix::RunTests, "run tests for a.src".to_owned()),
            (Fix::Rename, "rename at 0".to_owned()),
        ]
    );
}

#[tokio::test]
async fn disabled_and_inapplicable_producers_are_skipped() {
    let harness = Harness::with_chain();
    harness.source.set("/ws/a/NOTES.txt", "notes");
    let snapshot = harness.loaded().await;
    let token = CancellationToken::new();

    let out = registry()
        .run(&snapshot, &uri("/ws/a/NOTES.txt"), |_| true, &token)
        .await
        .unwrap();
    assert_eq!(out, vec![(Fix::RunTests, "run tests for NOTES.txt".to_owned())]);

    let out = registry()
        .run(
            &snapshot,
            &uri("/ws/a/a.src"),
            |tag| *tag == Fix::Rename,
            &token,
        )
        .await
        .unwrap();
    assert_eq!(out, vec![(Fix::Rename, "rename at 0".to_owned())]);
}

#[tokio::test]
async fn unit_producers_are_skipped_for_files_outside_units() {
    let harness = Harness::with_chain();
    harness.source.set("/ws/loose/l.src", "unit loose\n");
    let snapshot = harness.loaded().await;
    let token = CancellationToken::new();
    let loads = harness.loader.call_count();

    let out = registry()
        .run(&snapshot, &uri("/ws/loose/l.src"), |_| true, &token)
        .await
        .unwrap();
    assert_eq!(out, vec![(Fix::RunTests, "run tests for l.src".to_owned())]);
    // Both unit producers share one lookup.
    assert_eq!(harness.loader.call_count(), loads + 1);
}

#[tokio::test]
async fn cancelled_run_stops() {
    let harness = Harness::with_chain();
    let snapshot = harness.loaded().await;
    let token = CancellationToken::new();
    token.cancel();

    let outcome = registry()
        .run(&snapshot, &uri("/ws/a/a.src"), |_| true, &token)
        .await;
    assert!(matches!(outcome, Err(Error::Cancelled)));
}

#[test]
fn tags_keep_registration_order() {
    let tags: Vec<Fix> = registry().tags().collect();
    assert_eq!(
        tags,
        vec![Fix::OrganizeImports, Fix::Broken, Fix::RunTests, Fix::Rename]
    );
}
