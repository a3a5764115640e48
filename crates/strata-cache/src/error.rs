pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Failures of artifact cache persistence. Callers generally treat any of
/// them as a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry is not decodable: {0}")]
    Decode(#[from] bincode::Error),

    #[error("cache entry written by schema {found}, expected {expected}")]
    IncompatibleSchemaVersion { expected: u32, found: u32 },

    #[error("cache entry does not belong at {kind}/{key}")]
    Misplaced { kind: &'static str, key: String },
}
