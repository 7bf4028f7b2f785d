use grognon_store::{db::init_db, Store, StoreError};

fn table_names(store: &Store) -> Vec<String> {
    let conn = store.lock().unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_schema WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn migration_creates_metadata_tables() {
    let store = Store::open_in_memory().unwrap();
    assert_eq!(
        table_names(&store),
        vec!["columns", "connections", "cron_outputs", "crons", "tables"]
    );
}

#[test]
fn migration_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.lock().unwrap();
    init_db(&conn).unwrap();
    init_db(&conn).unwrap();
}

#[test]
fn open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("grognon.db");
    let store = Store::open(&path).unwrap();
    assert!(path.exists());
    drop(store);

    // Re-opening an existing file runs the migration again without error.
    Store::open(&path).unwrap();
}

#[test]
fn transaction_commits_on_ok() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            tx.execute(
                "INSERT INTO tables (connection_id, table_name) VALUES (1, 'users')",
                [],
            )?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

    let n: i64 = store
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM tables", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 1);
}

#[test]
fn transaction_rolls_back_on_error() {
    let store = Store::open_in_memory().unwrap();
    let result: Result<(), StoreError> = store.transaction(|tx| {
        tx.execute(
            "INSERT INTO tables (connection_id, table_name) VALUES (1, 'users')",
            [],
        )?;
        // Same primary key: constraint violation aborts the whole unit.
        tx.execute(
            "INSERT INTO tables (connection_id, table_name) VALUES (1, 'users')",
            [],
        )?;
        Ok(())
    });
    assert!(result.is_err());

    let n: i64 = store
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM tables", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 0);
}

#[test]
fn schedule_column_rejects_unknown_values() {
    let store = Store::open_in_memory().unwrap();
    let conn = store.lock().unwrap();
    conn.execute(
        "INSERT INTO connections (db_type, connection_url, created_at) VALUES ('sqlite', 'x', '2026-01-01')",
        [],
    )
    .unwrap();
    let err = conn.execute(
        "INSERT INTO crons (connection_id, name, command, schedule, created_at)
         VALUES (1, 'c', 'SELECT 1', 'fortnight', '2026-01-01')",
        [],
    );
    assert!(err.is_err());
}
