//! PostgreSQL support through the [`postgres`](https://crates.io/crates/postgres) crate.
//!
//! ## Transaction Safety
//!
//! PostgreSQL supports transactional DDL. With
//! [Migrator::with_transactional_steps](crate::Migrator::with_transactional_steps) each step runs
//! in its own transaction, so a failing step is rolled back completely and the database is left
//! as it was after the last successful step. Without it, statements of a failing step that ran
//! before the error stay applied.
//!
//! | Behavior | SQLite | MySQL | PostgreSQL |
//! |----------|--------|-------|------------|
//! | DDL in transactions | Fully supported | Causes implicit commit | Fully supported |
//! | Transactional steps | Supported | Rejected | Supported |
//! | Options table | Created if missing | Must exist | Created if missing |
//!
//! `CREATE DATABASE` and `CREATE TABLESPACE` can't run inside a transaction, so steps that use
//! them must not be run transactionally.

use crate::config::{MigrationsConfig, DEFAULT_DB_VERSION_OPTION, DEFAULT_OPTIONS_TABLE};
use crate::core::{normalize_version, SchemaVersion};
use crate::error::Error;
use crate::executor::SqlBatchExecutor;
use crate::store::{validate_table_name, VersionStore};
use postgres::Client;
use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export postgres types for building connections
pub use postgres::Client as PostgresClient;
pub use postgres::NoTls;

impl SqlBatchExecutor for Client {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        self.batch_execute(sql).map_err(Error::migration)
    }

    fn execute_batch_in_transaction(&mut self, sql: &str) -> Result<(), Error> {
        let mut tx = self.transaction().map_err(Error::migration)?;
        tx.batch_execute(sql).map_err(Error::migration)?;
        tx.commit().map_err(Error::migration)
    }
}

/// A [VersionStore] backed by a WordPress-style options table in PostgreSQL.
///
/// The table is created on open if it doesn't exist.
pub struct PostgresOptionStore {
    client: Mutex<Client>,
    table: String,
    option_name: String,
}

impl std::fmt::Debug for PostgresOptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresOptionStore")
            .field("table", &self.table)
            .field("option_name", &self.option_name)
            .finish()
    }
}

impl PostgresOptionStore {
    pub fn open(client: Client) -> Result<Self, Error> {
        Self::with_option(client, DEFAULT_OPTIONS_TABLE, DEFAULT_DB_VERSION_OPTION)
    }

    pub fn from_config(client: Client, config: &MigrationsConfig) -> Result<Self, Error> {
        Self::with_option(client, &config.options_table, &config.db_version_option)
    }

    pub fn with_option(
        mut client: Client,
        table: impl Into<String>,
        option_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let table = table.into();
        validate_table_name(&table)?;
        client.batch_execute(&create_table_sql(&table))?;

        Ok(Self {
            client: Mutex::new(client),
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

    fn client(&self) -> MutexGuard<'_, Client> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            option_id BIGSERIAL PRIMARY KEY,
            option_name VARCHAR(191) NOT NULL UNIQUE,
            option_value TEXT NOT NULL,
            autoload VARCHAR(20) NOT NULL DEFAULT 'yes'
        )",
        table
    )
}

impl VersionStore for PostgresOptionStore {
    fn get_version(&self) -> Result<SchemaVersion, Error> {
        let row = self.client().query_opt(
            &format!(
                "SELECT option_value FROM {} WHERE option_name = $1",
                self.table
            ),
            &[&self.option_name],
        )?;

        match row {
            Some(row) => normalize_version(&row.try_get::<_, String>(0)?),
            None => Ok(0),
        }
    }

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error> {
        self.client().execute(
            &format!(
                "INSERT INTO {} (option_name, option_value) VALUES ($1, $2)
                 ON CONFLICT (option_name) DO UPDATE SET option_value = EXCLUDED.option_value",
                self.table
            ),
            &[&self.option_name, &version.to_string()],
        )?;
        Ok(())
    }
}
