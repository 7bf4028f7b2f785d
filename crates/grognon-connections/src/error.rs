use grognon_core::{ConnectionId, GrognonError};
use grognon_store::StoreError;
use thiserror::Error;

/// Errors raised while managing or querying external sources.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The requested source kind has no driver.
    #[error("unsupported database type: {0}")]
    UnsupportedSource(String),

    /// Opening or probing the source failed. Recorded on the connection row.
    #[error("failed to connect to connection {id}: {reason}")]
    Connect { id: ConnectionId, reason: String },

    /// No (non-deleted) connection row with this id.
    #[error("connection not found: {id}")]
    NotFound { id: ConnectionId },

    /// The connection exists but has no live handle right now.
    #[error("connection {id} is not connected")]
    NotLive { id: ConnectionId },

    /// The handle was closed while a caller still held it.
    #[error("connection {id} was closed")]
    Closed { id: ConnectionId },

    /// A statement against the external source failed.
    #[error("query on connection {id} failed: {source}")]
    Query {
        id: ConnectionId,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement against the external source exceeded its time bound.
    #[error("query on connection {id} interrupted after {ms}ms")]
    Timeout { id: ConnectionId, ms: u64 },

    /// Metadata store SQL error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

impl From<ConnectionError> for GrognonError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::UnsupportedSource(_) => GrognonError::InvalidInput(e.to_string()),
            ConnectionError::NotFound { id } => GrognonError::NotFound {
                what: format!("connection {id}"),
            },
            ConnectionError::Connect { .. }
            | ConnectionError::NotLive { .. }
            | ConnectionError::Closed { .. }
            | ConnectionError::Query { .. }
            | ConnectionError::Timeout { .. } => GrognonError::Unavailable(e.to_string()),
            ConnectionError::Database(_) => GrognonError::Database(e.to_string()),
            ConnectionError::Store(store) => store.into(),
        }
    }
}
