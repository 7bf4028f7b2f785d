use rusqlite::Connection;

use crate::error::Result;

/// Initialise the metadata schema in `conn`.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
/// `crons.cron_id` is AUTOINCREMENT so a cron id (and the `cron_<id>` table
/// derived from it) is never handed out twice.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS connections (
            connection_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            db_type           TEXT    NOT NULL,
            connection_url    TEXT    NOT NULL,
            connected         INTEGER NOT NULL DEFAULT 0,
            last_error        TEXT,
            created_at        TEXT    NOT NULL,
            deleted_at        TEXT,               -- soft delete
            last_connected_at TEXT
        );

        CREATE TABLE IF NOT EXISTS crons (
            cron_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            connection_id INTEGER NOT NULL REFERENCES connections (connection_id),
            name          TEXT    NOT NULL,
            command       TEXT    NOT NULL,
            schedule      TEXT    NOT NULL
                CHECK (schedule IN ('minute', 'hour', 'day', 'week', 'month', 'year')),
            created_at    TEXT    NOT NULL,
            deleted_at    TEXT,
            last_run_at   TEXT
        );

        -- Sweep query: SELECT … WHERE deleted_at IS NULL
        CREATE INDEX IF NOT EXISTS idx_crons_connection ON crons (connection_id, deleted_at);

        CREATE TABLE IF NOT EXISTS cron_outputs (
            cron_id  INTEGER NOT NULL REFERENCES crons (cron_id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name     TEXT    NOT NULL,
            type     TEXT    NOT NULL CHECK (type IN ('TEXT', 'INTEGER', 'REAL')),
            PRIMARY KEY (cron_id, position)
        );

        CREATE TABLE IF NOT EXISTS tables (
            connection_id INTEGER NOT NULL,
            table_name    TEXT    NOT NULL,
            PRIMARY KEY (connection_id, table_name)
        );

        CREATE TABLE IF NOT EXISTS columns (
            connection_id INTEGER NOT NULL,
            table_name    TEXT    NOT NULL,
            cid           INTEGER NOT NULL,
            name          TEXT    NOT NULL,
            type          TEXT    NOT NULL,
            \"notnull\"     INTEGER NOT NULL,
            dflt_value    TEXT,
            pk            INTEGER NOT NULL,
            PRIMARY KEY (connection_id, table_name, cid)
        );
        ",
    )?;
    Ok(())
}
