use std::sync::Arc;

use strata_scheduler::Cancelled;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PromiseError {
    #[error("operation cancelled")]
    Cancelled,
    /// A genuine failure, shared by every waiter of the run that produced it.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),
}

impl PromiseError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PromiseError::Cancelled)
    }
}

impl From<Cancelled> for PromiseError {
    fn from(_: Cancelled) -> Self {
        PromiseError::Cancelled
    }
}

impl From<anyhow::Error> for PromiseError {
    fn from(err: anyhow::Error) -> Self {
        if err.is::<Cancelled>() {
            PromiseError::Cancelled
        } else {
            PromiseError::Failed(Arc::new(err))
        }
    }
}
