use std::sync::Arc;

use grognon_core::ConnectionId;
use grognon_store::Store;
use tracing::{debug, error, info, instrument};

use crate::error::{ConnectionError, Result};
use crate::registry::ConnectionRegistry;
use crate::types::{ColumnMetadata, SourceKind, TableMetadata};

/// A table and its columns as observed on the live source.
struct ObservedTable {
    name: String,
    columns: Vec<ObservedColumn>,
}

struct ObservedColumn {
    cid: i64,
    name: String,
    declared_type: String,
    not_null: bool,
    default_value: Option<String>,
    pk: i64,
}

/// Snapshots external schemas into the `tables` / `columns` cache.
pub struct SchemaReflector {
    store: Store,
    registry: Arc<ConnectionRegistry>,
}

impl SchemaReflector {
    pub fn new(store: Store, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Replace the cached schema of one connection with what the source
    /// reports right now.
    ///
    /// The source is read first, without touching the store. The wipe and
    /// the re-insert then happen in one transaction: on any failure the
    /// previous snapshot is left exactly as it was.
    #[instrument(skip(self))]
    pub fn reflect(&self, id: ConnectionId) -> Result<usize> {
        let connection = self.registry.get(id)?;
        let handle = self
            .registry
            .handle(id)
            .ok_or(ConnectionError::NotLive { id })?;

        let observed = match connection.kind()? {
            SourceKind::Sqlite => handle.with_conn(observe_sqlite)?,
        };

        let tables = observed.len();
        self.store.transaction(|tx| {
            tx.execute("DELETE FROM tables WHERE connection_id = ?1", [id])?;
            tx.execute("DELETE FROM columns WHERE connection_id = ?1", [id])?;

            let mut insert_table = tx.prepare(
                "INSERT INTO tables (connection_id, table_name) VALUES (?1, ?2)",
            )?;
            let mut insert_column = tx.prepare(
                "INSERT INTO columns
                 (connection_id, table_name, cid, name, type, \"notnull\", dflt_value, pk)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for table in &observed {
                insert_table.execute(rusqlite::params![id, table.name])?;
                for col in &table.columns {
                    insert_column.execute(rusqlite::params![
                        id,
                        table.name,
                        col.cid,
                        col.name,
                        col.declared_type,
                        col.not_null,
                        col.default_value,
                        col.pk,
                    ])?;
                }
                debug!(
                    connection_id = id,
                    table = %table.name,
                    columns = table.columns.len(),
                    "table reflected"
                );
            }
            Ok::<_, ConnectionError>(())
        })?;

        info!(connection_id = id, tables, "connection reflected");
        Ok(tables)
    }

    /// Reflect every non-deleted connection.
    ///
    /// A failure on one connection is logged and does not stop the pass.
    /// Returns the number of connections reflected successfully.
    pub fn reflect_all(&self) -> Result<usize> {
        info!("reflecting all connections");
        let mut reflected = 0;
        for connection in self.registry.list()? {
            match self.reflect(connection.id) {
                Ok(_) => reflected += 1,
                Err(e) => error!(connection_id = connection.id, "reflection failed: {e}"),
            }
        }
        Ok(reflected)
    }

    /// Cached tables of a connection, by name.
    pub fn list_tables(&self, id: ConnectionId) -> Result<Vec<TableMetadata>> {
        let db = self.store.lock()?;
        let mut stmt = db.prepare(
            "SELECT connection_id, table_name FROM tables
             WHERE connection_id = ?1 ORDER BY table_name",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(TableMetadata {
                connection_id: row.get(0)?,
                table_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Cached columns of a connection, grouped by table in declaration order.
    pub fn list_columns(&self, id: ConnectionId) -> Result<Vec<ColumnMetadata>> {
        let db = self.store.lock()?;
        let mut stmt = db.prepare(
            "SELECT connection_id, table_name, cid, name, type, \"notnull\", dflt_value, pk
             FROM columns WHERE connection_id = ?1 ORDER BY table_name, cid",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(ColumnMetadata {
                connection_id: row.get(0)?,
                table_name: row.get(1)?,
                cid: row.get(2)?,
                name: row.get(3)?,
                declared_type: row.get(4)?,
                not_null: row.get(5)?,
                default_value: row.get(6)?,
                pk: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Read user tables (engine-internal `sqlite_*` tables excluded) and their
/// column metadata from a SQLite source.
fn observe_sqlite(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<ObservedTable>> {
    let names: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_schema
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut stmt = conn.prepare(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)",
    )?;
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = stmt
            .query_map([&name], |row| {
                Ok(ObservedColumn {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get(3)?,
                    default_value: row.get(4)?,
                    pk: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tables.push(ObservedTable { name, columns });
    }
    Ok(tables)
}
