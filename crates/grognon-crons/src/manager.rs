use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use grognon_connections::{ConnectionError, ConnectionRegistry, LiveHandle};
use grognon_core::{ConnectionId, CronId};
use grognon_store::Store;
use tracing::{error, info, instrument, warn};

use crate::error::{CronError, Result};
use crate::ident::validate_columns;
use crate::infer::infer_command;
use crate::table::DynamicTableManager;
use crate::types::{ColumnType, Cron, CronDataRow, CronOutput, CronUpdate, NewCron, OutputColumn, Schedule};

const CRON_COLUMNS: &str =
    "cron_id, connection_id, name, command, schedule, created_at, deleted_at, last_run_at";

/// Cron definitions: creation with schema inference, frozen-schema
/// updates, soft deletion, and reads of stored results.
pub struct CronManager {
    store: Store,
    registry: Arc<ConnectionRegistry>,
    tables: DynamicTableManager,
    query_timeout: Option<Duration>,
}

impl CronManager {
    pub fn new(
        store: Store,
        registry: Arc<ConnectionRegistry>,
        query_timeout: Option<Duration>,
    ) -> Self {
        let tables = DynamicTableManager::new(store.clone());
        Self {
            store,
            registry,
            tables,
            query_timeout,
        }
    }

    /// Create a cron: infer its output schema from one run of the command,
    /// persist it, and create its result table.
    ///
    /// Nothing is written unless inference and identifier validation pass.
    /// If table creation fails afterwards the cron row is removed again.
    #[instrument(skip(self, new), fields(connection_id = new.connection_id, name = %new.name))]
    pub fn create(&self, new: NewCron) -> Result<Cron> {
        let handle = self.live_handle(new.connection_id)?;
        let columns = infer_command(&handle, &new.command, self.query_timeout)?;
        validate_columns(&columns)?;

        let id = insert_cron(&*self.store.lock()?, &new, Utc::now())?;

        if let Err(e) = self.tables.create_for(id, &columns) {
            error!(cron_id = id, "result table creation failed: {e}");
            self.discard(id);
            return Err(e);
        }

        info!(cron_id = id, columns = columns.len(), "cron created");
        self.get(id)
    }

    /// Non-deleted crons, optionally restricted to one connection.
    pub fn list(&self, connection_id: Option<ConnectionId>) -> Result<Vec<Cron>> {
        let db = self.store.lock()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {CRON_COLUMNS} FROM crons
             WHERE deleted_at IS NULL AND (?1 IS NULL OR connection_id = ?1)
             ORDER BY cron_id"
        ))?;
        let rows = stmt.query_map([connection_id], row_to_cron)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// A non-deleted cron by id.
    pub fn get(&self, id: CronId) -> Result<Cron> {
        match self.find(id)? {
            Some(c) if c.deleted_at.is_none() => Ok(c),
            _ => Err(CronError::NotFound { id }),
        }
    }

    /// Output columns of a cron, in table order.
    pub fn outputs(&self, id: CronId) -> Result<Vec<CronOutput>> {
        self.get(id)?;
        self.load_outputs(id)
    }

    /// Stored result rows of a cron, newest first.
    pub fn data(&self, id: CronId) -> Result<Vec<CronDataRow>> {
        let columns: Vec<OutputColumn> = self.outputs(id)?.iter().map(CronOutput::column).collect();
        self.tables.rows(id, &columns)
    }

    /// Replace name, command, and schedule of a cron.
    ///
    /// The new command is inferred against the live source and must
    /// produce exactly the stored outputs (same count, and name and type
    /// at every position). Otherwise the update is rejected and the cron
    /// is left untouched.
    #[instrument(skip(self, update))]
    pub fn update(&self, id: CronId, update: CronUpdate) -> Result<Cron> {
        let cron = self.get(id)?;
        let handle = self.live_handle(cron.connection_id)?;
        let columns = infer_command(&handle, &update.command, self.query_timeout)?;

        self.store.transaction(|tx| {
            let stored = query_outputs(tx, id)?;
            check_same_outputs(&stored, &columns)?;
            tx.execute(
                "UPDATE crons SET name = ?1, command = ?2, schedule = ?3
                 WHERE cron_id = ?4 AND deleted_at IS NULL",
                rusqlite::params![update.name, update.command, update.schedule.to_string(), id],
            )?;
            Ok::<_, CronError>(())
        })?;

        info!(cron_id = id, "cron updated");
        self.get(id)
    }

    /// Soft-delete a cron. Its result table is kept.
    ///
    /// Deleting an already-deleted cron is a no-op.
    #[instrument(skip(self))]
    pub fn delete(&self, id: CronId) -> Result<()> {
        let cron = self.find(id)?.ok_or(CronError::NotFound { id })?;
        if cron.deleted_at.is_some() {
            info!(cron_id = id, "cron already deleted");
            return Ok(());
        }
        self.store.lock()?.execute(
            "UPDATE crons SET deleted_at = ?1 WHERE cron_id = ?2",
            rusqlite::params![Utc::now(), id],
        )?;
        info!(cron_id = id, "cron deleted");
        Ok(())
    }

    /// Non-deleted crons due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<Cron>> {
        Ok(self
            .list(None)?
            .into_iter()
            .filter(|c| c.needs_to_run(now))
            .collect())
    }

    /// Record the start of a run attempt.
    pub fn stamp_last_run(&self, id: CronId, at: DateTime<Utc>) -> Result<()> {
        let n = self.store.lock()?.execute(
            "UPDATE crons SET last_run_at = ?1 WHERE cron_id = ?2",
            rusqlite::params![at, id],
        )?;
        if n == 0 {
            return Err(CronError::NotFound { id });
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    pub fn tables(&self) -> &DynamicTableManager {
        &self.tables
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    // --- private helpers ---------------------------------------------------

    /// The live handle of a non-deleted connection.
    fn live_handle(&self, connection_id: ConnectionId) -> Result<Arc<LiveHandle>> {
        match self.registry.get(connection_id) {
            Ok(_) => {}
            Err(ConnectionError::NotFound { .. }) => {
                return Err(CronError::ConnectionNotFound { id: connection_id })
            }
            Err(e) => return Err(e.into()),
        }
        self.registry
            .handle(connection_id)
            .ok_or(CronError::ConnectionNotFound { id: connection_id })
    }

    /// Any cron row, deleted or not.
    fn find(&self, id: CronId) -> Result<Option<Cron>> {
        let db = self.store.lock()?;
        match db.query_row(
            &format!("SELECT {CRON_COLUMNS} FROM crons WHERE cron_id = ?1"),
            [id],
            row_to_cron,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn load_outputs(&self, id: CronId) -> Result<Vec<CronOutput>> {
        let db = self.store.lock()?;
        query_outputs(&db, id)
    }

    /// Best-effort removal of a cron whose table could not be created.
    fn discard(&self, id: CronId) {
        let removed = self
            .store
            .lock()
            .map_err(CronError::from)
            .and_then(|db| Ok(db.execute("DELETE FROM crons WHERE cron_id = ?1", [id])?));
        match removed {
            Ok(_) => warn!(cron_id = id, "cron row discarded after failed creation"),
            Err(e) => error!(cron_id = id, "failed to discard cron row: {e}"),
        }
    }
}

/// Insert the cron row, but only while its connection is not deleted.
///
/// Inference runs without any lock held, so the connection may have been
/// removed (and its crons cascaded) in the meantime.
fn insert_cron(db: &rusqlite::Connection, new: &NewCron, now: DateTime<Utc>) -> Result<CronId> {
    let inserted = db.execute(
        "INSERT INTO crons (connection_id, name, command, schedule, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5
         WHERE EXISTS (
             SELECT 1 FROM connections WHERE connection_id = ?1 AND deleted_at IS NULL
         )",
        rusqlite::params![
            new.connection_id,
            new.name,
            new.command,
            new.schedule.to_string(),
            now
        ],
    )?;
    if inserted == 0 {
        return Err(CronError::ConnectionNotFound {
            id: new.connection_id,
        });
    }
    Ok(db.last_insert_rowid())
}

fn query_outputs(db: &rusqlite::Connection, id: CronId) -> Result<Vec<CronOutput>> {
    let mut stmt = db.prepare(
        "SELECT cron_id, position, name, type FROM cron_outputs
         WHERE cron_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([id], |row| {
        let position: i64 = row.get(1)?;
        let type_text: String = row.get(3)?;
        let column_type = type_text.parse::<ColumnType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(CronOutput {
            cron_id: row.get(0)?,
            position: position as usize,
            name: row.get(2)?,
            column_type,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Reject any difference between the frozen outputs and a new inference.
fn check_same_outputs(stored: &[CronOutput], inferred: &[OutputColumn]) -> Result<()> {
    if stored.len() != inferred.len() {
        return Err(CronError::SchemaMismatch(format!(
            "output count changed from {} to {}",
            stored.len(),
            inferred.len()
        )));
    }
    for (old, new) in stored.iter().zip(inferred) {
        if old.name != new.name {
            return Err(CronError::SchemaMismatch(format!(
                "column {} renamed {} at position {}",
                old.name, new.name, old.position
            )));
        }
        if old.column_type != new.column_type {
            return Err(CronError::SchemaMismatch(format!(
                "column {} changed type from {} to {}",
                old.name, old.column_type, new.column_type
            )));
        }
    }
    Ok(())
}

/// Map a SQLite row to a `Cron`.
fn row_to_cron(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cron> {
    let schedule_text: String = row.get(4)?;
    let schedule = schedule_text.parse::<Schedule>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Cron {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        name: row.get(2)?,
        command: row.get(3)?,
        schedule,
        created_at: row.get(5)?,
        deleted_at: row.get(6)?,
        last_run_at: row.get(7)?,
    })
}
