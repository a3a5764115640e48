use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Runs `f` over `items` with at most `limit` invocations in flight.
///
/// The futures are polled together from the calling task; a counting
/// semaphore gates how many have started their body. Results come back in
/// input order.
pub async fn for_each_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let tasks = items.into_iter().map(|item| {
        let permits = Arc::clone(&permits);
        let f = &f;
        async move {
            // The semaphore is never closed.
            let _permit = permits.acquire().await.ok();
            f(item).await
        }
    });
    futures::future::join_all(tasks).await
}
