//! Cooperative cancellation and bounded concurrency helpers.
//!
//! Every blocking point in a snapshot (awaiting initialization, a reload, or a
//! memoized computation) takes a [`CancellationToken`]. Cancellation surfaces
//! as the distinguished [`Cancelled`] error so callers can tell it apart from
//! genuine failures.

mod bounded;
mod scope;

pub use bounded::for_each_bounded;
pub use scope::BackgroundScope;
pub use tokio_util::sync::CancellationToken;

use std::future::Future;

/// The operation was abandoned because its cancellation scope ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Returns `Err(Cancelled)` once `token` has been cancelled.
pub fn check(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}

/// Drives `fut` until it completes or `token` is cancelled, whichever is first.
///
/// On cancellation `fut` is dropped without being polled again.
pub async fn run_until_cancelled<F>(token: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
