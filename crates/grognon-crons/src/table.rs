use chrono::{DateTime, Utc};
use grognon_core::CronId;
use grognon_store::Store;
use rusqlite::types::{Type, Value};
use rusqlite::ToSql;
use tracing::{debug, info};

use crate::error::{CronError, Result};
use crate::ident::{validate_columns, Ident, TIMESTAMP_COLUMN};
use crate::types::{CellValue, CronDataRow, OutputColumn};

/// Bound parameters per generated INSERT. The bundled SQLite allows far
/// more; this keeps statements small enough to cache.
const MAX_BOUND_PARAMS: usize = 999;

/// Owns the physical `cron_<id>` result tables.
#[derive(Clone)]
pub struct DynamicTableManager {
    store: Store,
}

impl DynamicTableManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create the result table of `cron_id` and persist its output schema.
    ///
    /// The DDL runs outside any transaction. The `cron_outputs` rows are
    /// then written in their own transaction: if that fails, the table
    /// exists without recorded outputs and the caller is expected to
    /// remove the cron row.
    pub fn create_for(&self, cron_id: CronId, columns: &[OutputColumn]) -> Result<()> {
        let table = Ident::cron_table(cron_id)?;
        let index = Ident::cron_index(cron_id)?;
        let idents = validate_columns(columns)?;

        let mut defs = vec![format!("\"{TIMESTAMP_COLUMN}\" TEXT NOT NULL")];
        defs.extend(
            idents
                .iter()
                .zip(columns)
                .map(|(ident, col)| format!("{} {}", ident.quoted(), col.column_type.as_sql())),
        );
        let ddl = format!(
            "CREATE TABLE {table_q} ({defs});
             CREATE INDEX {index_q} ON {table_q} (\"{TIMESTAMP_COLUMN}\" DESC);",
            table_q = table.quoted(),
            index_q = index.quoted(),
            defs = defs.join(", "),
        );
        self.store.lock()?.execute_batch(&ddl)?;
        debug!(cron_id, table = %table, "result table created");

        self.store.transaction(|tx| {
            let mut insert = tx.prepare(
                "INSERT INTO cron_outputs (cron_id, position, name, type) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, col) in columns.iter().enumerate() {
                insert.execute(rusqlite::params![
                    cron_id,
                    position as i64,
                    col.name,
                    col.column_type.as_sql()
                ])?;
            }
            Ok::<_, CronError>(())
        })?;

        info!(cron_id, columns = columns.len(), "cron outputs recorded");
        Ok(())
    }

    /// Append `rows` to the result table of `cron_id`, all stamped `at`.
    ///
    /// Rows are written with multi-row INSERTs inside one transaction, so a
    /// run is stored completely or not at all.
    pub fn append(
        &self,
        cron_id: CronId,
        columns: &[OutputColumn],
        at: DateTime<Utc>,
        rows: &[Vec<Option<CellValue>>],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = Ident::cron_table(cron_id)?;
        let idents = validate_columns(columns)?;

        let width = columns.len() + 1;
        let per_stmt = (MAX_BOUND_PARAMS / width).max(1);
        let column_list = std::iter::once(format!("\"{TIMESTAMP_COLUMN}\""))
            .chain(idents.iter().map(Ident::quoted))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholder = format!("({})", vec!["?"; width].join(", "));

        self.store.transaction(|tx| {
            for chunk in rows.chunks(per_stmt) {
                let sql = format!(
                    "INSERT INTO {} ({column_list}) VALUES {}",
                    table.quoted(),
                    vec![placeholder.as_str(); chunk.len()].join(", ")
                );
                let mut params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * width);
                for row in chunk {
                    params.push(&at);
                    params.extend(row.iter().map(|v| v as &dyn ToSql));
                }
                tx.prepare_cached(&sql)?.execute(params.as_slice())?;
            }
            Ok::<_, CronError>(())
        })?;

        debug!(cron_id, rows = rows.len(), "result rows appended");
        Ok(rows.len())
    }

    /// Every stored row of `cron_id`, newest first.
    pub fn rows(&self, cron_id: CronId, columns: &[OutputColumn]) -> Result<Vec<CronDataRow>> {
        let table = Ident::cron_table(cron_id)?;
        let idents = validate_columns(columns)?;

        let select = std::iter::once(format!("\"{TIMESTAMP_COLUMN}\""))
            .chain(idents.iter().map(Ident::quoted))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select} FROM {} ORDER BY \"{TIMESTAMP_COLUMN}\" DESC",
            table.quoted()
        );

        let db = self.store.lock()?;
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let timestamp: DateTime<Utc> = row.get(0)?;
            let mut values = Vec::with_capacity(columns.len());
            for i in 1..=columns.len() {
                let raw: Value = row.get(i)?;
                let cell = CellValue::from_value(&raw).map_err(|_| {
                    rusqlite::Error::InvalidColumnType(i, columns[i - 1].name.clone(), Type::Blob)
                })?;
                values.push(cell);
            }
            Ok(CronDataRow { timestamp, values })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Whether the result table of `cron_id` exists.
    pub fn exists(&self, cron_id: CronId) -> Result<bool> {
        let table = Ident::cron_table(cron_id)?;
        let db = self.store.lock()?;
        let found: i64 = db.query_row(
            "SELECT count(*) FROM sqlite_schema WHERE type = 'table' AND name = ?1",
            [table.as_str()],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }
}
