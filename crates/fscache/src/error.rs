//! Cache errors

use thiserror::Error;

/// Errors returned by the caches in this crate.
///
/// `NotFound` and `NameExists` are routine outcomes that drive the
/// create-or-adopt paths; callers are expected to match on them rather than
/// log them as failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Key is not present (or has expired)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Key is already present
    #[error("Name exists: {0}")]
    NameExists(String),

    /// Pool is at its specialization concurrency limit
    #[error("Too many requests: {0}")]
    Busy(String),

    /// Entry cannot be indexed (missing identity or address)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The cache worker has shut down
    #[error("Cache worker stopped")]
    WorkerStopped,
}

impl CacheError {
    /// True for [`CacheError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// True for [`CacheError::NameExists`]
    pub fn is_name_exists(&self) -> bool {
        matches!(self, CacheError::NameExists(_))
    }
}
