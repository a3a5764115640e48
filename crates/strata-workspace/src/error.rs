use std::sync::Arc;

use strata_cache::CacheError;
use strata_core::{DocumentUri, UnitId};
use strata_memoize::PromiseError;
use strata_scheduler::Cancelled;
use strata_vfs::ReadError;

/// Why a load did not produce metadata.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("no units found for {scopes}")]
    NoUnits { scopes: String },
    #[error("load failed: {0:#}")]
    Failed(Arc<anyhow::Error>),
}

impl LoadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}

impl From<Cancelled> for LoadError {
    fn from(_: Cancelled) -> Self {
        LoadError::Cancelled
    }
}

impl From<anyhow::Error> for LoadError {
    fn from(err: anyhow::Error) -> Self {
        if err.is::<Cancelled>() {
            LoadError::Cancelled
        } else {
            LoadError::Failed(Arc::new(err))
        }
    }
}

impl From<PromiseError> for LoadError {
    fn from(err: PromiseError) -> Self {
        match err {
            PromiseError::Cancelled => LoadError::Cancelled,
            PromiseError::Failed(err) => LoadError::Failed(err),
        }
    }
}

/// Errors returned by snapshot queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Load(LoadError),
    #[error("type checking failed: {0:#}")]
    Check(Arc<anyhow::Error>),
    #[error("tool invocation failed: {0:#}")]
    Tool(Arc<anyhow::Error>),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("no units found for file {0}")]
    NoUnitsForFile(DocumentUri),
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    #[error("no builtin file is known")]
    NoBuiltin,
    #[error("snapshot {sequence_id} has been destroyed")]
    Destroyed { sequence_id: u64 },
    #[error("workspace has been shut down")]
    ShutDown,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Load(LoadError::Cancelled))
    }
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Error::Cancelled
    }
}

impl From<LoadError> for Error {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Cancelled => Error::Cancelled,
            err => Error::Load(err),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
