use grognon_core::GrognonError;
use thiserror::Error;

/// Errors raised by the metadata store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the store lock.
    #[error("metadata store lock poisoned")]
    Poisoned,

    /// The data directory could not be prepared.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for GrognonError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(io) => GrognonError::Io(io),
            other => GrognonError::Database(other.to_string()),
        }
    }
}
