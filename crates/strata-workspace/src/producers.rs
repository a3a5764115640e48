//! Per-file feature producers driven over a snapshot.
//!
//! Features built on top of a snapshot (quick fixes, test discovery, ...)
//! register as producers. A run visits them in registration order; a
//! failing producer is logged and skipped so it cannot hide the results of
//! the others.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use strata_core::DocumentUri;
use strata_metadata::UnitMetadata;
use strata_scheduler::{check, CancellationToken};
use strata_vfs::FileHandle;

use crate::error::Result;
use crate::request_memo::RequestMemo;
use crate::snapshot::SnapshotRef;

/// Everything a producer sees.
pub struct ProducerRequest<T> {
    pub tag: T,
    pub snapshot: SnapshotRef,
    pub file: FileHandle,
    /// The narrowest unit containing the file, for producers that asked for
    /// it.
    pub unit: Option<Arc<UnitMetadata>>,
    pub token: CancellationToken,
}

type Predicate = Box<dyn Fn(&FileHandle) -> bool + Send + Sync>;
type Compute<T, O> =
    Box<dyn Fn(ProducerRequest<T>) -> BoxFuture<'static, anyhow::Result<Vec<O>>> + Send + Sync>;

struct Producer<T, O> {
    tag: T,
    needs_unit: bool,
    applies: Predicate,
    compute: Compute<T, O>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RunMemo {
    NarrowestUnit,
}

/// An ordered list of producers, each tagged with the capability it
/// provides.
pub struct ProducerRegistry<T, O> {
    producers: Vec<Producer<T, O>>,
}

impl<T, O> Default for ProducerRegistry<T, O> {
    fn default() -> Self {
        Self {
            producers: Vec::new(),
        }
    }
}

impl<T, O> ProducerRegistry<T, O>
where
    T: Copy + fmt::Debug + Send + 'static,
    O: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a producer. `applies` filters files; with `needs_unit` the
    /// producer is only run when the file belongs to a unit.
    pub fn register<P, F>(mut self, tag: T, needs_unit: bool, applies: P, compute: F) -> Self
    where
        P: Fn(&FileHandle) -> bool + Send + Sync + 'static,
        F: Fn(ProducerRequest<T>) -> BoxFuture<'static, anyhow::Result<Vec<O>>>
            + Send
            + Sync
            + 'static,
    {
        self.producers.push(Producer {
            tag,
            needs_unit,
            applies: Box::new(applies),
            compute: Box::new(compute),
        });
        self
    }

    pub fn tags(&self) -> impl Iterator<Item = T> + '_ {
        self.producers.iter().map(|p| p.tag)
    }

    /// Runs every enabled, applicable producer for `uri` in order.
    pub async fn run(
        &self,
        snapshot: &SnapshotRef,
        uri: &DocumentUri,
        enabled: impl Fn(&T) -> bool,
        token: &CancellationToken,
    ) -> Result<Vec<(T, O)>> {
        let file = snapshot.read_file(uri)?;
        let mut memo = RequestMemo::new();
        let mut out = Vec::new();

        for producer in &self.producers {
            check(token)?;
            if !enabled(&producer.tag) || !(producer.applies)(&file) {
                continue;
            }

            let unit = if producer.needs_unit {
                let unit = memo
                    .get_or_try_compute(RunMemo::NarrowestUnit, || async {
                        match snapshot.narrowest_metadata_for_file(uri, token).await {
                            Ok(unit) => Ok(Some(unit)),
                            Err(err) if err.is_cancelled() => Err(err),
                            Err(err) => {
                                tracing::debug!(
                                    target = "strata.workspace",
                                    %uri,
                                    error = %err,
                                    "no unit for producers"
                                );
                                Ok(None)
                            }
                        }
                    })
                    .await?;
                match unit.as_ref() {
                    Some(unit) => Some(Arc::clone(unit)),
                    None => continue,
                }
            } else {
                None
            };

            let request = ProducerRequest {
                tag: producer.tag,
                snapshot: snapshot.clone(),
                file: file.clone(),
                unit,
                token: token.clone(),
            };
            match (producer.compute)(request).await {
                Ok(values) => out.extend(values.into_iter().map(|v| (producer.tag, v))),
                Err(_) if token.is_cancelled() => check(token)?,
                Err(err) => tracing::warn!(
                    target = "strata.workspace",
                    tag = ?producer.tag,
                    %uri,
                    error = %err,
                    "producer failed"
                ),
            }
        }
        Ok(out)
    }
}
