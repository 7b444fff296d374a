use thiserror::Error;

/// Failure of a save or load against the profiling store.
///
/// A missing session is not an error: `load` returns `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
