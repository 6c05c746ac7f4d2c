//! SQLite support through [`rusqlite`](https://crates.io/crates/rusqlite).
//!
//! SQLite runs DDL inside transactions, so [Migrator::with_transactional_steps](crate::Migrator::with_transactional_steps)
//! makes each step all-or-nothing on this backend.
//!
//! ```
//! use bookings_migrations::sqlite::SqliteOptionStore;
//! use bookings_migrations::{
//!     persist_version_on_success, AutoMigrationsHandler, EventDispatcher, Migrator, VersionStore,
//! };
//! use rusqlite::Connection;
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("1-up.sql"),
//!     "CREATE TABLE ${prefix}bookings (id INTEGER PRIMARY KEY, start INTEGER, `end` INTEGER);",
//! )
//! .unwrap();
//! let db = dir.path().join("site.db");
//!
//! let store = Arc::new(SqliteOptionStore::open(Connection::open(&db).unwrap()).unwrap());
//! let events = EventDispatcher::new();
//! persist_version_on_success(&events, Arc::clone(&store));
//!
//! let migrator = Migrator::new(Connection::open(&db).unwrap(), dir.path(), store.get_version().unwrap())
//!     .with_placeholder_values(std::collections::HashMap::from([(
//!         "prefix".to_string(),
//!         "wp_eddbk_".to_string(),
//!     )]));
//! AutoMigrationsHandler::new(migrator, 1, &events).invoke();
//!
//! assert_eq!(store.get_version().unwrap(), 1);
//! ```

use crate::config::{MigrationsConfig, DEFAULT_DB_VERSION_OPTION, DEFAULT_OPTIONS_TABLE};
use crate::core::{normalize_version, SchemaVersion};
use crate::error::Error;
use crate::executor::SqlBatchExecutor;
use crate::store::{validate_table_name, VersionStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, PoisonError};

impl SqlBatchExecutor for Connection {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        Connection::execute_batch(self, sql).map_err(Error::migration)
    }

    fn execute_batch_in_transaction(&mut self, sql: &str) -> Result<(), Error> {
        let tx = self.transaction().map_err(Error::migration)?;
        tx.execute_batch(sql).map_err(Error::migration)?;
        tx.commit().map_err(Error::migration)
    }
}

/// A [VersionStore] backed by a WordPress-style options table in SQLite.
///
/// The table is created on open if it doesn't exist.
#[derive(Debug)]
pub struct SqliteOptionStore {
    conn: Mutex<Connection>,
    table: String,
    option_name: String,
}

impl SqliteOptionStore {
    /// Open a store on `wp_options`, keyed by `wp_bookings_cqrs_db_version`.
    pub fn open(conn: Connection) -> Result<Self, Error> {
        Self::with_option(conn, DEFAULT_OPTIONS_TABLE, DEFAULT_DB_VERSION_OPTION)
    }

    /// Open a store using the options table and option name from `config`.
    pub fn from_config(conn: Connection, config: &MigrationsConfig) -> Result<Self, Error> {
        Self::with_option(conn, &config.options_table, &config.db_version_option)
    }

    pub fn with_option(
        conn: Connection,
        table: impl Into<String>,
        option_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let table = table.into();
        validate_table_name(&table)?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                option_id INTEGER PRIMARY KEY AUTOINCREMENT,
                option_name TEXT NOT NULL UNIQUE,
                option_value TEXT NOT NULL,
                autoload TEXT NOT NULL DEFAULT 'yes'
            )",
            table
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table,
            option_name: option_name.into(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn option_name(&self) -> &str {
        &self.option_name
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VersionStore for SqliteOptionStore {
    fn get_version(&self) -> Result<SchemaVersion, Error> {
        let value: Option<String> = self
            .conn()
            .query_row(
                &format!(
                    "SELECT option_value FROM {} WHERE option_name = ?1",
                    self.table
                ),
                [&self.option_name],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(value) => normalize_version(&value),
            None => Ok(0),
        }
    }

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error> {
        self.conn().execute(
            &format!(
                "INSERT INTO {} (option_name, option_value) VALUES (?1, ?2)
                 ON CONFLICT(option_name) DO UPDATE SET option_value = excluded.option_value",
                self.table
            ),
            params![self.option_name, version.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDispatcher, ON_MIGRATION_FAILED};
    use crate::handler::{AutoMigrationsHandler, MigrationOutcome};
    use crate::migrator::Migrator;
    use crate::notice::MigrationFailureNotice;
    use crate::store::{persist_version_on_success, InMemoryVersionStore};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    fn write_bookings_migrations(dir: &Path) {
        let files = [
            (
                "1-up.sql",
                "CREATE TABLE ${prefix}bookings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    start INTEGER NOT NULL,
                    `end` INTEGER NOT NULL,
                    service_id INTEGER,
                    resource_id INTEGER,
                    client_tz TEXT
                );
                CREATE TABLE ${prefix}booking_status_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    booking_id INTEGER NOT NULL,
                    status TEXT NOT NULL
                );",
            ),
            (
                "1-down.sql",
                "DROP TABLE ${prefix}booking_status_logs; DROP TABLE ${prefix}bookings;",
            ),
            (
                "2-up.sql",
                "CREATE TABLE ${prefix}sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    start INTEGER NOT NULL,
                    `end` INTEGER NOT NULL,
                    rule_id INTEGER
                );",
            ),
            ("2-down.sql", "DROP TABLE ${prefix}sessions;"),
            (
                "3-up.sql",
                "CREATE TABLE ${prefix}resources (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
            ),
            ("3-down.sql", "DROP TABLE ${prefix}resources;"),
        ];
        for (name, sql) in files {
            std::fs::write(dir.join(name), sql).unwrap();
        }
    }

    fn prefix() -> HashMap<String, String> {
        HashMap::from([("prefix".to_string(), "wp_eddbk_".to_string())])
    }

    #[test]
    fn executes_multi_statement_batches() {
        let mut conn = Connection::open_in_memory().unwrap();
        SqlBatchExecutor::execute_batch(
            &mut conn,
            "CREATE TABLE a (id INTEGER); CREATE TABLE b (id INTEGER); INSERT INTO a VALUES (1);",
        )
        .unwrap();
        assert!(table_exists(&conn, "a"));
        assert!(table_exists(&conn, "b"));
    }

    #[test]
    fn driver_errors_become_migration_errors() {
        let mut conn = Connection::open_in_memory().unwrap();
        match SqlBatchExecutor::execute_batch(&mut conn, "CREATE TABLE a (id INTEGER); NOT SQL") {
            Err(Error::Migration(message)) => assert!(message.contains("syntax error")),
            other => panic!("expected a migration error, got {:?}", other),
        }
        // statements before the failing one stay applied
        assert!(table_exists(&conn, "a"));
    }

    #[test]
    fn transactional_batches_roll_back_on_failure() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch_in_transaction("CREATE TABLE a (id INTEGER); NOT SQL");
        assert!(matches!(result, Err(Error::Migration(_))));
        assert!(!table_exists(&conn, "a"));

        conn.execute_batch_in_transaction("CREATE TABLE b (id INTEGER);")
            .unwrap();
        assert!(table_exists(&conn, "b"));
    }

    #[test]
    fn option_store_reads_missing_option_as_zero() {
        let store = SqliteOptionStore::open(Connection::open_in_memory().unwrap()).unwrap();
        assert_eq!(store.get_version().unwrap(), 0);

        store.set_version(2).unwrap();
        store.set_version(3).unwrap();
        assert_eq!(store.get_version().unwrap(), 3);

        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM wp_options", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn option_store_normalizes_stored_text() {
        let conn = Connection::open_in_memory().unwrap();
        let store = SqliteOptionStore::with_option(conn, "wp_2_options", "eddbk_db_version").unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO wp_2_options (option_name, option_value) VALUES ('eddbk_db_version', ' 4.0 ')",
                [],
            )
            .unwrap();
        assert_eq!(store.get_version().unwrap(), 4);

        store
            .conn()
            .execute(
                "UPDATE wp_2_options SET option_value = 'latest' WHERE option_name = 'eddbk_db_version'",
                [],
            )
            .unwrap();
        assert_eq!(
            store.get_version(),
            Err(Error::InvalidVersion("latest".to_string()))
        );
    }

    #[test]
    fn option_store_rejects_unsafe_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            SqliteOptionStore::with_option(conn, "wp_options; DROP TABLE x", "v"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn upgrade_and_downgrade_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        write_bookings_migrations(dir.path());
        let db = dir.path().join("site.db");

        let store = Arc::new(SqliteOptionStore::open(Connection::open(&db).unwrap()).unwrap());
        let events = EventDispatcher::new();
        persist_version_on_success(&events, Arc::clone(&store));

        let migrator = Migrator::new(
            Connection::open(&db).unwrap(),
            dir.path(),
            store.get_version().unwrap(),
        )
        .with_placeholder_values(prefix());
        let mut handler = AutoMigrationsHandler::new(migrator, 3, &events);
        assert_eq!(handler.invoke(), MigrationOutcome::Succeeded);
        assert_eq!(store.get_version().unwrap(), 3);

        let conn = handler.into_migrator().into_executor();
        for table in [
            "wp_eddbk_bookings",
            "wp_eddbk_booking_status_logs",
            "wp_eddbk_sessions",
            "wp_eddbk_resources",
        ] {
            assert!(table_exists(&conn, table), "{} should exist", table);
        }

        let migrator = Migrator::new(conn, dir.path(), store.get_version().unwrap())
            .with_placeholder_values(prefix());
        let mut handler = AutoMigrationsHandler::new(migrator, 1, &events);
        assert!(handler.invoke().is_success());
        assert_eq!(store.get_version().unwrap(), 1);

        let conn = handler.into_migrator().into_executor();
        assert!(table_exists(&conn, "wp_eddbk_bookings"));
        assert!(!table_exists(&conn, "wp_eddbk_sessions"));
        assert!(!table_exists(&conn, "wp_eddbk_resources"));
    }

    #[test]
    fn missing_file_keeps_earlier_steps_and_the_stored_version() {
        let dir = tempfile::tempdir().unwrap();
        write_bookings_migrations(dir.path());
        std::fs::remove_file(dir.path().join("3-up.sql")).unwrap();

        let store = Arc::new(InMemoryVersionStore::default());
        let events = EventDispatcher::new();
        persist_version_on_success(&events, Arc::clone(&store));
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        events.subscribe(ON_MIGRATION_FAILED, move |event| {
            if let Some(notice) = MigrationFailureNotice::from_event(event) {
                sink.lock().unwrap().push(notice);
            }
        });

        let migrator = Migrator::new(Connection::open_in_memory().unwrap(), dir.path(), 0)
            .with_placeholder_values(prefix());
        let mut handler = AutoMigrationsHandler::new(migrator, 3, &events);

        assert!(!handler.invoke().is_success());
        assert_eq!(store.get_version().unwrap(), 0);
        let notices = notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].reasons()[0].contains("3-up.sql"));

        let conn = handler.into_migrator().into_executor();
        assert!(table_exists(&conn, "wp_eddbk_bookings"));
        assert!(table_exists(&conn, "wp_eddbk_sessions"));
        assert!(!table_exists(&conn, "wp_eddbk_resources"));
    }

    #[test]
    fn transactional_steps_leave_no_partial_step() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-up.sql"), "CREATE TABLE one (id INTEGER);").unwrap();
        std::fs::write(
            dir.path().join("2-up.sql"),
            "CREATE TABLE two (id INTEGER); INSERT INTO missing VALUES (1);",
        )
        .unwrap();

        let mut migrator = Migrator::new(Connection::open_in_memory().unwrap(), dir.path(), 0)
            .with_transactional_steps(true);
        assert!(matches!(migrator.migrate(2), Err(Error::Migration(_))));

        let conn = migrator.into_executor();
        assert!(table_exists(&conn, "one"));
        assert!(!table_exists(&conn, "two"));
    }
}
