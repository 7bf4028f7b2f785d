//! `ConnectionRegistry`: owns every live handle to an external source.
//!
//! The handle map is only mutated by `add`, `remove`, `refresh` and `setup`,
//! which serialise on a lifecycle lock so a refresh can never resurrect a
//! handle for a connection that is being removed. Readers (`handle`) go
//! straight to the map.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use grognon_core::ConnectionId;
use grognon_store::Store;
use tracing::{error, info, instrument, warn};

use crate::error::{ConnectionError, Result};
use crate::handle::LiveHandle;
use crate::types::{Connection, NewConnection, SourceKind};

const CONNECTION_COLUMNS: &str = "connection_id, db_type, connection_url, connected, last_error,
     created_at, deleted_at, last_connected_at";

pub struct ConnectionRegistry {
    store: Store,
    handles: DashMap<ConnectionId, Arc<LiveHandle>>,
    lifecycle: Mutex<()>,
    busy_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(store: Store, busy_timeout: Duration) -> Self {
        Self {
            store,
            handles: DashMap::new(),
            lifecycle: Mutex::new(()),
            busy_timeout,
        }
    }

    /// Register a new source.
    ///
    /// The row is persisted before any connect attempt, whatever its kind.
    /// A failed connect is recorded on the row (`connected = false`,
    /// `last_error`) and still returns `Ok`. An unsupported kind is recorded
    /// the same way but returned as `UnsupportedSource`.
    #[instrument(skip(self, new), fields(db_type = %new.db_type))]
    pub fn add(&self, new: NewConnection) -> Result<Connection> {
        let kind = new
            .db_type
            .parse::<SourceKind>()
            .map_err(ConnectionError::UnsupportedSource);
        let last_error = kind.as_ref().err().map(|e| e.to_string());

        let _lifecycle = self.lifecycle();
        let id = {
            let db = self.store.lock()?;
            db.execute(
                "INSERT INTO connections (db_type, connection_url, connected, last_error, created_at)
                 VALUES (?1, ?2, 0, ?3, ?4)",
                rusqlite::params![new.db_type, new.connection_url, last_error, Utc::now()],
            )?;
            db.last_insert_rowid()
        };
        info!(connection_id = id, "connection registered");

        let kind = kind.inspect_err(|e| warn!(connection_id = id, "{e}"))?;
        if let Err(e) = self.connect(id, kind, &new.connection_url) {
            warn!(connection_id = id, "initial connect failed: {e}");
        }
        self.get(id)
    }

    /// Soft-delete a connection and its crons, then close its live handle.
    ///
    /// Removing an already-deleted connection is a no-op.
    #[instrument(skip(self))]
    pub fn remove(&self, id: ConnectionId) -> Result<()> {
        let _lifecycle = self.lifecycle();
        let connection = self.find(id)?.ok_or(ConnectionError::NotFound { id })?;

        if connection.is_deleted() {
            info!(connection_id = id, "connection already removed");
        } else {
            let now = Utc::now();
            let crons = self.store.transaction(|tx| {
                tx.execute(
                    "UPDATE connections
                     SET connected = 0, last_error = 'connection removed', deleted_at = ?1
                     WHERE connection_id = ?2",
                    rusqlite::params![now, id],
                )?;
                let crons = tx.execute(
                    "UPDATE crons SET deleted_at = ?1
                     WHERE connection_id = ?2 AND deleted_at IS NULL",
                    rusqlite::params![now, id],
                )?;
                Ok::<_, ConnectionError>(crons)
            })?;
            info!(connection_id = id, crons, "connection removed");
        }

        if let Some((_, handle)) = self.handles.remove(&id) {
            handle.close();
        }
        Ok(())
    }

    /// Connect every non-deleted connection. Called once at startup.
    ///
    /// Failures are recorded on the rows and logged; returns the number of
    /// live handles afterwards.
    pub fn setup(&self) -> Result<usize> {
        info!("setting up connections");
        self.refresh()
    }

    /// Ping every live handle and reconnect whatever is not live.
    ///
    /// A failed ping counts as a lost handle: it is closed and a fresh
    /// connect is attempted. Rows of an unsupported kind are skipped.
    /// Returns the number of live handles afterwards.
    #[instrument(skip(self))]
    pub fn refresh(&self) -> Result<usize> {
        let _lifecycle = self.lifecycle();
        for connection in self.list()? {
            let id = connection.id;
            if let Some(handle) = self.handle(id) {
                match handle.ping() {
                    Ok(()) => continue,
                    Err(e) => {
                        warn!(connection_id = id, "ping failed, reconnecting: {e}");
                        if let Some((_, lost)) = self.handles.remove(&id) {
                            lost.close();
                        }
                    }
                }
            }
            let kind = match connection.kind() {
                Ok(kind) => kind,
                Err(e) => {
                    error!(connection_id = id, "skipping connection: {e}");
                    continue;
                }
            };
            if let Err(e) = self.connect(id, kind, &connection.connection_url) {
                error!(connection_id = id, "reconnect failed: {e}");
            }
        }
        Ok(self.handles.len())
    }

    /// All non-deleted connections, oldest first.
    pub fn list(&self) -> Result<Vec<Connection>> {
        let db = self.store.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections
             WHERE deleted_at IS NULL ORDER BY connection_id"
        ))?;
        let rows = stmt.query_map([], row_to_connection)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// A non-deleted connection by id.
    pub fn get(&self, id: ConnectionId) -> Result<Connection> {
        match self.find(id)? {
            Some(c) if !c.is_deleted() => Ok(c),
            _ => Err(ConnectionError::NotFound { id }),
        }
    }

    /// The live handle for `id`, if one is currently open.
    pub fn handle(&self, id: ConnectionId) -> Option<Arc<LiveHandle>> {
        self.handles.get(&id).map(|h| Arc::clone(h.value()))
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.handles.contains_key(&id)
    }

    // --- private helpers ---------------------------------------------------

    /// Any connection row, deleted or not.
    fn find(&self, id: ConnectionId) -> Result<Option<Connection>> {
        let db = self.store.lock()?;
        match db.query_row(
            &format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE connection_id = ?1"),
            [id],
            row_to_connection,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open + probe the source and record the outcome on its row.
    ///
    /// Only a successful attempt inserts a handle. The caller holds the
    /// lifecycle lock.
    fn connect(&self, id: ConnectionId, kind: SourceKind, url: &str) -> Result<()> {
        match LiveHandle::open(id, kind, url, self.busy_timeout) {
            Ok(handle) => {
                let updated = self.store.lock()?.execute(
                    "UPDATE connections
                     SET connected = 1, last_error = NULL, last_connected_at = ?1
                     WHERE connection_id = ?2",
                    rusqlite::params![Utc::now(), id],
                );
                if let Err(e) = updated {
                    handle.close();
                    return Err(e.into());
                }
                if let Some(previous) = self.handles.insert(id, Arc::new(handle)) {
                    previous.close();
                }
                info!(connection_id = id, "connected");
                Ok(())
            }
            Err(e) => {
                self.store.lock()?.execute(
                    "UPDATE connections SET connected = 0, last_error = ?1
                     WHERE connection_id = ?2",
                    rusqlite::params![e.to_string(), id],
                )?;
                Err(e)
            }
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Map a SQLite row to a `Connection`.
fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: row.get(0)?,
        db_type: row.get(1)?,
        connection_url: row.get(2)?,
        connected: row.get(3)?,
        last_error: row.get(4)?,
        created_at: row.get(5)?,
        deleted_at: row.get(6)?,
        last_connected_at: row.get(7)?,
    })
}
