use chrono::{DateTime, Utc};
use grognon_core::ConnectionId;
use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

/// Kind of external source. Only embedded SQLite files are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sqlite,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(SourceKind::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

/// Registration request coming from the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnection {
    /// Source kind as text, e.g. `"sqlite"`.
    pub db_type: String,
    pub connection_url: String,
}

impl NewConnection {
    pub fn new(db_type: impl Into<String>, connection_url: impl Into<String>) -> Self {
        Self {
            db_type: db_type.into(),
            connection_url: connection_url.into(),
        }
    }
}

/// A persisted connection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    /// Source kind exactly as registered; may name a kind with no driver.
    pub db_type: String,
    pub connection_url: String,
    /// Outcome of the most recent connect attempt.
    pub connected: bool,
    /// Error text of the most recent failed attempt, cleared on success.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl Connection {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The parsed source kind, or `UnsupportedSource` for a row whose
    /// `db_type` has no driver.
    pub fn kind(&self) -> Result<SourceKind, ConnectionError> {
        self.db_type
            .parse()
            .map_err(ConnectionError::UnsupportedSource)
    }
}

/// A user table of an external source, as last reflected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub connection_id: ConnectionId,
    pub table_name: String,
}

/// One column of a reflected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub connection_id: ConnectionId,
    pub table_name: String,
    /// Ordinal position inside the table.
    pub cid: i64,
    pub name: String,
    /// Declared type as written in the source DDL (may be empty).
    pub declared_type: String,
    pub not_null: bool,
    /// Default value literal, verbatim.
    pub default_value: Option<String>,
    /// 1-based position inside the primary key, 0 when not part of it.
    pub pk: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_through_text() {
        assert_eq!("sqlite".parse::<SourceKind>(), Ok(SourceKind::Sqlite));
        assert_eq!(SourceKind::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        assert_eq!("postgres".parse::<SourceKind>(), Err("postgres".to_string()));
        assert!("SQLite".parse::<SourceKind>().is_err());
    }

    #[test]
    fn connection_kind_reports_unsupported_db_type() {
        let mut conn = Connection {
            id: 1,
            db_type: "sqlite".into(),
            connection_url: "app.db".into(),
            connected: false,
            last_error: None,
            created_at: Utc::now(),
            deleted_at: None,
            last_connected_at: None,
        };
        assert_eq!(conn.kind().unwrap(), SourceKind::Sqlite);

        conn.db_type = "postgres".into();
        assert!(matches!(
            conn.kind(),
            Err(ConnectionError::UnsupportedSource(ref k)) if k == "postgres"
        ));
    }
}
