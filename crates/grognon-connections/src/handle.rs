use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use grognon_core::ConnectionId;
use rusqlite::types::Value;
use rusqlite::{ErrorCode, OpenFlags};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, Result};
use crate::types::SourceKind;

/// SQLite VM instructions between two deadline checks.
const PROGRESS_STEP: i32 = 1_000;

/// Every row returned by one statement, buffered in memory.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    /// Column names, in the order the statement returns them.
    pub columns: Vec<String>,
    /// One entry per row, each aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

/// An open connection to an external source.
///
/// Statements are serialised on the inner mutex. Closing takes the
/// connection out of the slot, so a handle is closed at most once and any
/// later use fails with [`ConnectionError::Closed`].
pub struct LiveHandle {
    connection_id: ConnectionId,
    conn: Mutex<Option<rusqlite::Connection>>,
}

impl LiveHandle {
    /// Open the source and run a liveness probe.
    ///
    /// SQLite sources are opened read-only and must already exist.
    pub fn open(
        connection_id: ConnectionId,
        kind: SourceKind,
        url: &str,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let conn = match kind {
            SourceKind::Sqlite => {
                let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = rusqlite::Connection::open_with_flags(url, flags).map_err(|e| {
                    ConnectionError::Connect {
                        id: connection_id,
                        reason: e.to_string(),
                    }
                })?;
                conn.busy_timeout(busy_timeout)
                    .map_err(|e| ConnectionError::Connect {
                        id: connection_id,
                        reason: e.to_string(),
                    })?;
                conn
            }
        };

        let handle = Self {
            connection_id,
            conn: Mutex::new(Some(conn)),
        };
        handle.probe().map_err(|e| ConnectionError::Connect {
            id: connection_id,
            reason: e.to_string(),
        })?;
        info!(connection_id, %kind, "live handle opened");
        Ok(handle)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Check the handle still answers.
    ///
    /// A handle that is busy running another statement is alive by
    /// definition, so this never waits behind a long query.
    pub fn ping(&self) -> Result<()> {
        let guard = match self.conn.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!(connection_id = self.connection_id, "handle busy, ping skipped");
                return Ok(());
            }
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        let conn = guard.as_ref().ok_or(ConnectionError::Closed {
            id: self.connection_id,
        })?;
        probe(conn).map_err(|source| ConnectionError::Query {
            id: self.connection_id,
            source,
        })
    }

    fn probe(&self) -> Result<()> {
        self.with_conn(probe)
    }

    /// Run `f` against the underlying connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>,
    {
        let guard = self.guard();
        let conn = guard.as_ref().ok_or(ConnectionError::Closed {
            id: self.connection_id,
        })?;
        f(conn).map_err(|source| ConnectionError::Query {
            id: self.connection_id,
            source,
        })
    }

    /// Execute `sql` once and buffer every returned row.
    ///
    /// With `timeout` set, SQLite is interrupted once the deadline passes
    /// and the call fails with [`ConnectionError::Timeout`].
    pub fn query(&self, sql: &str, timeout: Option<Duration>) -> Result<QueryOutput> {
        let guard = self.guard();
        let conn = guard.as_ref().ok_or(ConnectionError::Closed {
            id: self.connection_id,
        })?;

        if let Some(limit) = timeout {
            let deadline = Instant::now() + limit;
            conn.progress_handler(PROGRESS_STEP, Some(move || Instant::now() >= deadline));
        }
        let result = collect_rows(conn, sql);
        if timeout.is_some() {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        result.map_err(|source| match (source.sqlite_error_code(), timeout) {
            (Some(ErrorCode::OperationInterrupted), Some(limit)) => {
                warn!(connection_id = self.connection_id, "query interrupted by time bound");
                ConnectionError::Timeout {
                    id: self.connection_id,
                    ms: limit.as_millis() as u64,
                }
            }
            _ => ConnectionError::Query {
                id: self.connection_id,
                source,
            },
        })
    }

    /// Close the underlying connection.
    ///
    /// Returns `false` when the handle had already been closed.
    pub fn close(&self) -> bool {
        let Some(conn) = self.guard().take() else {
            return false;
        };
        if let Err((_, e)) = conn.close() {
            warn!(connection_id = self.connection_id, "failed to close connection: {e}");
        }
        info!(connection_id = self.connection_id, "live handle closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.guard().is_none()
    }

    // A panic mid-statement leaves the rusqlite connection itself usable.
    fn guard(&self) -> MutexGuard<'_, Option<rusqlite::Connection>> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn probe(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
}

fn collect_rows(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<QueryOutput> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        rows.push(values);
    }
    Ok(QueryOutput { columns, rows })
}
