use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use strata_scheduler::{run_until_cancelled, CancellationToken};
use tokio::sync::watch;

use crate::error::PromiseError;

type ComputeFn<V> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<V, PromiseError>> + Send + Sync>;

enum State<V> {
    Idle,
    Running { cancel: CancellationToken },
    Done(Result<V, PromiseError>),
}

struct Inner<V> {
    state: State<V>,
    /// Callers currently blocked in [`Promise::get`].
    waiters: usize,
    /// Dropped once a run finishes for good.
    compute: Option<ComputeFn<V>>,
    runs: usize,
}

/// A lazily computed, shared value.
///
/// The first [`Promise::get`] starts the computation on the tokio runtime with
/// its own cancellation token. Every concurrent caller waits for the same run.
/// When all waiters have given up the run is cancelled; a cancelled run leaves
/// the promise idle so the next `get` starts over. Finished outcomes, including
/// genuine failures, are kept for the life of the promise.
pub struct Promise<V> {
    name: String,
    inner: Mutex<Inner<V>>,
    changed: watch::Sender<u64>,
}

impl<V> Promise<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, compute: F) -> Arc<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, PromiseError>> + Send + 'static,
    {
        let compute: ComputeFn<V> = Arc::new(move |token| Box::pin(compute(token)));
        let (changed, _) = watch::channel(0);
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: State::Idle,
                waiters: 0,
                compute: Some(compute),
                runs: 0,
            }),
            changed,
        })
    }

    /// A promise that is already resolved to `value`.
    pub fn ready(name: impl Into<String>, value: V) -> Arc<Self> {
        let (changed, _) = watch::channel(0);
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: State::Done(Ok(value)),
                waiters: 0,
                compute: None,
                runs: 0,
            }),
            changed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The finished outcome, if any.
    pub fn cached(&self) -> Option<Result<V, PromiseError>> {
        match &self.inner.lock().state {
            State::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// How many times the computation has been started.
    pub fn runs(&self) -> usize {
        self.inner.lock().runs
    }

    /// Waits for the value, starting the computation if nobody else has.
    ///
    /// Cancelling `token` abandons the wait only; the run continues as long as
    /// another caller is still waiting for it.
    pub async fn get(self: &Arc<Self>, token: &CancellationToken) -> Result<V, PromiseError> {
        let mut changed = self.changed.subscribe();
        loop {
            if token.is_cancelled() {
                return Err(PromiseError::Cancelled);
            }
            {
                let mut inner = self.inner.lock();
                match &inner.state {
                    State::Done(outcome) => return outcome.clone(),
                    State::Running { .. } => {}
                    State::Idle => {
                        let Some(compute) = inner.compute.clone() else {
                            strata_core::bug!("promise {} is idle without a computation", self.name);
                            return Err(PromiseError::Cancelled);
                        };
                        let cancel = CancellationToken::new();
                        inner.state = State::Running {
                            cancel: cancel.clone(),
                        };
                        inner.runs += 1;
                        self.start(compute, cancel);
                    }
                }
                inner.waiters += 1;
            }

            let _waiting = WaitGuard { promise: &**self };
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(PromiseError::Cancelled),
                // The sender lives in `self`, so this cannot report closure.
                _ = changed.changed() => {}
            }
        }
    }

    fn start(self: &Arc<Self>, compute: ComputeFn<V>, cancel: CancellationToken) {
        tracing::trace!(target = "strata.memoize", promise = %self.name, "starting computation");
        let fut = compute(cancel.clone());
        let mut run = RunGuard {
            promise: Arc::clone(self),
            finished: false,
        };
        tokio::spawn(async move {
            let outcome = match run_until_cancelled(&cancel, fut).await {
                Ok(Ok(value)) => Some(Ok(value)),
                Ok(Err(PromiseError::Failed(err))) => Some(Err(PromiseError::Failed(err))),
                Ok(Err(PromiseError::Cancelled)) | Err(_) => None,
            };
            run.finish(outcome);
        });
    }

    fn notify(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }
}

/// Settles the promise when a run ends, including by panic or runtime
/// shutdown.
struct RunGuard<V: Clone + Send + Sync + 'static> {
    promise: Arc<Promise<V>>,
    finished: bool,
}

impl<V: Clone + Send + Sync + 'static> RunGuard<V> {
    fn finish(&mut self, outcome: Option<Result<V, PromiseError>>) {
        self.finished = true;
        {
            let mut inner = self.promise.inner.lock();
            match outcome {
                Some(outcome) => {
                    inner.state = State::Done(outcome);
                    inner.compute = None;
                }
                None => {
                    tracing::trace!(
                        target = "strata.memoize",
                        promise = %self.promise.name,
                        "computation cancelled"
                    );
                    inner.state = State::Idle;
                }
            }
        }
        self.promise.notify();
    }
}

impl<V: Clone + Send + Sync + 'static> Drop for RunGuard<V> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(None);
        }
    }
}

struct WaitGuard<'a, V> {
    promise: &'a Promise<V>,
}

impl<V> Drop for WaitGuard<'_, V> {
    fn drop(&mut self) {
        let mut inner = self.promise.inner.lock();
        inner.waiters = inner.waiters.saturating_sub(1);
        if inner.waiters == 0 {
            if let State::Running { cancel } = &inner.state {
                cancel.cancel();
            }
        }
    }
}

impl<V> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let state = match inner.state {
            State::Idle => "idle",
            State::Running { .. } => "running",
            State::Done(Ok(_)) => "done",
            State::Done(Err(_)) => "failed",
        };
        f.debug_struct("Promise")
            .field("name", &self.name)
            .field("state", &state)
            .field("waiters", &inner.waiters)
            .finish()
    }
}
