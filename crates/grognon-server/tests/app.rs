use std::path::{Path, PathBuf};

use grognon_core::{GrognonConfig, GrognonError};
use grognon_crons::{CellValue, ColumnType, Schedule};
use grognon_server::AppState;
use grognon_store::Store;
use tempfile::TempDir;

fn source(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("crm.db");
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, score REAL);
             CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
             INSERT INTO users (email, score) VALUES ('a@x', 1.0), ('b@x', 2.5), ('c@x', NULL);",
        )
        .unwrap();
    path
}

fn state() -> AppState {
    AppState::new(GrognonConfig::default(), Store::open_in_memory().unwrap())
}

fn url(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn new_connection_is_reflected_and_listed() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir);
    let app = state();

    let conn = app.create_connection("sqlite", &url(&path)).unwrap();
    assert!(conn.connected);

    let tables: Vec<String> = app
        .list_tables(conn.id)
        .unwrap()
        .into_iter()
        .map(|t| t.table_name)
        .collect();
    assert_eq!(tables, vec!["notes", "users"]);

    let users: Vec<(String, String)> = app
        .list_columns(conn.id)
        .unwrap()
        .into_iter()
        .filter(|c| c.table_name == "users")
        .map(|c| (c.name, c.declared_type))
        .collect();
    assert_eq!(
        users,
        vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("email".to_string(), "TEXT".to_string()),
            ("score".to_string(), "REAL".to_string()),
        ]
    );

    assert_eq!(app.list_connections().unwrap().len(), 1);
    assert_eq!(app.get_connection(conn.id).unwrap().id, conn.id);
}

#[test]
fn unsupported_source_is_invalid_input() {
    let app = state();
    let err = app.create_connection("postgres", "postgres://localhost").unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    let listed = app.list_connections().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].db_type, "postgres");
    assert!(!listed[0].connected);
    assert!(listed[0].last_error.as_deref().unwrap().contains("postgres"));
    assert!(app.list_tables(listed[0].id).unwrap().is_empty());
}

#[test]
fn cron_lifecycle_through_the_boundary() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir);
    let app = state();
    let conn = app.create_connection("sqlite", &url(&path)).unwrap();

    let err = app
        .create_cron(conn.id, "users", "SELECT count(*) AS n FROM users", "fortnight")
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert!(err.to_string().contains("fortnight"), "{err}");

    let err = app
        .create_cron(conn.id, "scores", "SELECT score FROM users", "hour")
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert!(err.to_string().contains("column score is null at row 2"), "{err}");

    let cron = app
        .create_cron(conn.id, "users", "SELECT count(*) AS n FROM users", "minute")
        .unwrap();
    assert_eq!(cron.schedule, Schedule::Minute);
    assert_eq!(app.list_crons(Some(conn.id)).unwrap().len(), 1);
    assert_eq!(app.get_cron(cron.id).unwrap().name, "users");

    let outputs = app.get_cron_outputs(cron.id).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].name, "n");
    assert_eq!(outputs[0].column_type, ColumnType::Integer);

    let report = app.engine().sweep().unwrap();
    assert_eq!(report.succeeded, 1);
    let data = app.get_cron_data(cron.id).unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].values, vec![Some(CellValue::Integer(3))]);

    let err = app
        .update_cron(cron.id, "users", "SELECT 'three' AS n", "minute")
        .unwrap_err();
    assert!(err.to_string().contains("cannot update cron outputs"), "{err}");
    let updated = app
        .update_cron(cron.id, "users daily", "SELECT count(id) AS n FROM users", "day")
        .unwrap();
    assert_eq!(updated.schedule, Schedule::Day);

    app.delete_cron(cron.id).unwrap();
    let err = app.get_cron(cron.id).unwrap_err();
    assert!(matches!(err, GrognonError::NotFound { .. }));
    assert!(app.list_crons(None).unwrap().is_empty());
}

#[test]
fn deleting_a_connection_cascades_to_crons() {
    let dir = TempDir::new().unwrap();
    let path = source(&dir);
    let app = state();
    let conn = app.create_connection("sqlite", &url(&path)).unwrap();
    let cron = app
        .create_cron(conn.id, "notes", "SELECT count(*) AS notes FROM notes", "hour")
        .unwrap();

    app.delete_connection(conn.id).unwrap();

    assert_eq!(app.get_connection(conn.id).unwrap_err().code(), "NOT_FOUND");
    assert_eq!(app.get_cron(cron.id).unwrap_err().code(), "NOT_FOUND");
    assert!(app.list_connections().unwrap().is_empty());
    assert!(!app.registry.is_live(conn.id));

    let err = app
        .create_cron(conn.id, "again", "SELECT 1 AS n", "hour")
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn offline_connection_is_kept_but_rejects_crons() {
    let dir = TempDir::new().unwrap();
    let app = state();
    let conn = app
        .create_connection("sqlite", &url(&dir.path().join("nope.db")))
        .unwrap();
    assert!(!conn.connected);
    assert!(conn.last_error.is_some());
    assert!(app.list_tables(conn.id).unwrap().is_empty());

    let err = app
        .create_cron(conn.id, "n", "SELECT 1 AS n", "minute")
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
