use std::sync::Arc;
use std::time::Duration;

use grognon_connections::{
    ColumnMetadata, Connection, ConnectionRegistry, NewConnection, SchemaReflector, TableMetadata,
};
use grognon_core::{ConnectionId, CronId, GrognonConfig, Result};
use grognon_crons::{
    Cron, CronDataRow, CronEngine, CronError, CronManager, CronOutput, CronUpdate, NewCron,
    Schedule,
};
use grognon_store::Store;
use tracing::{info, warn};

/// Central shared state, one per process.
///
/// Every operation is blocking: it touches the metadata store and, for
/// connection and cron creation, the external source. Async callers should
/// go through `spawn_blocking`.
pub struct AppState {
    pub config: GrognonConfig,
    pub store: Store,
    pub registry: Arc<ConnectionRegistry>,
    pub reflector: Arc<SchemaReflector>,
    pub crons: Arc<CronManager>,
}

impl AppState {
    pub fn new(config: GrognonConfig, store: Store) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            store.clone(),
            Duration::from_millis(config.connections.busy_timeout_ms),
        ));
        let reflector = Arc::new(SchemaReflector::new(store.clone(), Arc::clone(&registry)));
        let crons = Arc::new(CronManager::new(
            store.clone(),
            Arc::clone(&registry),
            config.scheduler.query_timeout(),
        ));
        Self {
            config,
            store,
            registry,
            reflector,
            crons,
        }
    }

    /// Scheduler loop over this state's crons, ticking per config.
    pub fn engine(&self) -> CronEngine {
        CronEngine::new(
            Arc::clone(&self.crons),
            Duration::from_secs(self.config.scheduler.tick_secs),
        )
    }

    // --- connections -------------------------------------------------------

    /// Register a source. The row is kept even when the first connect
    /// fails; a live source is reflected right away.
    pub fn create_connection(&self, db_type: &str, connection_url: &str) -> Result<Connection> {
        let connection = self
            .registry
            .add(NewConnection::new(db_type, connection_url))?;
        if self.registry.is_live(connection.id) {
            if let Err(e) = self.reflector.reflect(connection.id) {
                warn!(connection_id = connection.id, "initial reflection failed: {e}");
            }
        }
        Ok(connection)
    }

    pub fn list_connections(&self) -> Result<Vec<Connection>> {
        Ok(self.registry.list()?)
    }

    pub fn get_connection(&self, id: ConnectionId) -> Result<Connection> {
        Ok(self.registry.get(id)?)
    }

    /// Soft-delete a connection together with its crons.
    pub fn delete_connection(&self, id: ConnectionId) -> Result<()> {
        Ok(self.registry.remove(id)?)
    }

    /// Re-snapshot one connection's schema now.
    pub fn reflect_connection(&self, id: ConnectionId) -> Result<usize> {
        Ok(self.reflector.reflect(id)?)
    }

    pub fn list_tables(&self, id: ConnectionId) -> Result<Vec<TableMetadata>> {
        self.registry.get(id)?;
        Ok(self.reflector.list_tables(id)?)
    }

    pub fn list_columns(&self, id: ConnectionId) -> Result<Vec<ColumnMetadata>> {
        self.registry.get(id)?;
        Ok(self.reflector.list_columns(id)?)
    }

    // --- crons -------------------------------------------------------------

    pub fn create_cron(
        &self,
        connection_id: ConnectionId,
        name: &str,
        command: &str,
        schedule: &str,
    ) -> Result<Cron> {
        let cron = self.crons.create(NewCron {
            connection_id,
            name: name.to_string(),
            command: command.to_string(),
            schedule: parse_schedule(schedule)?,
        })?;
        info!(cron_id = cron.id, connection_id, "cron registered");
        Ok(cron)
    }

    pub fn list_crons(&self, connection_id: Option<ConnectionId>) -> Result<Vec<Cron>> {
        Ok(self.crons.list(connection_id)?)
    }

    pub fn get_cron(&self, id: CronId) -> Result<Cron> {
        Ok(self.crons.get(id)?)
    }

    pub fn get_cron_outputs(&self, id: CronId) -> Result<Vec<CronOutput>> {
        Ok(self.crons.outputs(id)?)
    }

    /// Stored rows, newest first.
    pub fn get_cron_data(&self, id: CronId) -> Result<Vec<CronDataRow>> {
        Ok(self.crons.data(id)?)
    }

    pub fn update_cron(&self, id: CronId, name: &str, command: &str, schedule: &str) -> Result<Cron> {
        Ok(self.crons.update(
            id,
            CronUpdate {
                name: name.to_string(),
                command: command.to_string(),
                schedule: parse_schedule(schedule)?,
            },
        )?)
    }

    /// Soft-delete a cron; its result table is kept.
    pub fn delete_cron(&self, id: CronId) -> Result<()> {
        Ok(self.crons.delete(id)?)
    }
}

fn parse_schedule(text: &str) -> std::result::Result<Schedule, CronError> {
    text.parse().map_err(CronError::InvalidSchedule)
}
