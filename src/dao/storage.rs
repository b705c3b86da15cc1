use std::error::Error;
use thiserror::Error;

/// Result alias for session store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure reported by any session store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("{backend} store unavailable: {message}")]
    Unavailable {
        /// Backend name used in logs (`mongodb`, `couchdb`, `memory`).
        backend: &'static str,
        /// Summary of the failed operation.
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure.
    pub fn unavailable(
        backend: &'static str,
        message: String,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            backend,
            message,
            source: Box::new(source),
        }
    }

    /// Name of the backend that failed.
    pub fn backend(&self) -> &'static str {
        match self {
            StorageError::Unavailable { backend, .. } => backend,
        }
    }
}
