use grognon_connections::ConnectionError;
use grognon_core::{ConnectionId, CronId, GrognonError};
use grognon_store::StoreError;
use thiserror::Error;

use crate::types::ColumnType;

/// Why a command's result could not be turned into a column schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Zero rows: nothing to infer from.
    #[error("query returned no rows")]
    EmptyResult,

    #[error("column {column} is null at row {row}")]
    NullValue { column: String, row: usize },

    #[error("column {column} has mixed types: {expected} then {found}")]
    MixedTypes {
        column: String,
        expected: ColumnType,
        found: ColumnType,
    },

    /// A value kind with no canonical column type (e.g. BLOB).
    #[error("column {column} has unsupported type {kind}")]
    UnknownType { column: String, kind: String },
}

/// Errors raised by cron management and execution.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("cron not found: {id}")]
    NotFound { id: CronId },

    /// The owning connection does not exist or has no live handle.
    #[error("connection {id} not found or not connected")]
    ConnectionNotFound { id: ConnectionId },

    /// A generated table or column name failed the allow-list.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// An update would change the frozen output schema.
    #[error("cannot update cron outputs, {0}")]
    SchemaMismatch(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A scheduled run produced something that cannot be stored.
    #[error("execution of cron {id} failed: {reason}")]
    Execution { id: CronId, reason: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CronError>;

impl From<CronError> for GrognonError {
    fn from(e: CronError) -> Self {
        match e {
            CronError::Inference(_)
            | CronError::InvalidIdentifier(_)
            | CronError::SchemaMismatch(_)
            | CronError::InvalidSchedule(_) => GrognonError::InvalidInput(e.to_string()),
            CronError::NotFound { id } => GrognonError::NotFound {
                what: format!("cron {id}"),
            },
            CronError::ConnectionNotFound { id } => GrognonError::NotFound {
                what: format!("live connection {id}"),
            },
            CronError::Execution { .. } => GrognonError::Internal(e.to_string()),
            CronError::Connection(c) => c.into(),
            CronError::Database(_) => GrognonError::Database(e.to_string()),
            CronError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_reason_survives_conversion() {
        let err: GrognonError = CronError::from(InferenceError::NullValue {
            column: "n".into(),
            row: 2,
        })
        .into();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("column n is null at row 2"), "{err}");
    }

    #[test]
    fn schema_mismatch_keeps_its_prefix() {
        let err = CronError::SchemaMismatch("output count changed from 1 to 2".into());
        assert_eq!(
            err.to_string(),
            "cannot update cron outputs, output count changed from 1 to 2"
        );
    }

    #[test]
    fn missing_things_map_to_not_found() {
        let err: GrognonError = CronError::ConnectionNotFound { id: 4 }.into();
        assert_eq!(err.code(), "NOT_FOUND");
        let err: GrognonError = CronError::NotFound { id: 9 }.into();
        assert_eq!(err.to_string(), "Not found: cron 9");
    }
}
