use crate::CancellationToken;

/// A long-lived cancellation scope for background work.
///
/// The workspace owns one root scope; every snapshot derives its own child
/// from the root (never from its predecessor, which may already be
/// cancelled) and cancels it on teardown. Cancelling a scope cancels every
/// scope derived from it.
#[derive(Clone, Debug, Default)]
pub struct BackgroundScope {
    token: CancellationToken,
}

impl BackgroundScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Derives a scope that is cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::trace!(target = "strata.scheduler", "background scope cancelled");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
