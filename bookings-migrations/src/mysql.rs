//! MySQL support through the [`mysql`](https://crates.io/crates/mysql) crate.
//!
//! MySQL commits implicitly around every DDL statement, so a migration step can't be made
//! atomic here. [Migrator::with_transactional_steps](crate::Migrator::with_transactional_steps)
//! is rejected on these connections and a step that fails half way leaves its earlier
//! statements applied.
//!
//! Migration files hold several statements, so the connection must allow multi-statement
//! queries, which the `mysql` crate does by default.

use crate::config::{MigrationsConfig, DEFAULT_DB_VERSION_OPTION, DEFAULT_OPTIONS_TABLE};
use crate::core::{normalize_version, SchemaVersion};
use crate::error::Error;
use crate::executor::SqlBatchExecutor;
use crate::store::{validate_table_name, VersionStore};
use mysql::prelude::*;
use mysql::{Conn, Pool, PooledConn};

/// Run a batch and read every result set it produces. MySQL reports an error in a later
/// statement only when its result set is reached.
fn drain_batch<Q: Queryable>(conn: &mut Q, sql: &str) -> Result<(), Error> {
    let mut result = conn.query_iter(sql).map_err(Error::migration)?;
    while let Some(result_set) = result.iter() {
        for row in result_set {
            row.map_err(Error::migration)?;
        }
    }
    Ok(())
}

impl SqlBatchExecutor for Conn {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        drain_batch(self, sql)
    }
}

impl SqlBatchExecutor for PooledConn {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        drain_batch(self, sql)
    }
}

/// A [VersionStore] backed by the WordPress options table.
///
/// The table must already exist; WordPress creates it on install.
#[derive(Debug, Clone)]
pub struct MysqlOptionStore {
    pool: Pool,
    table: String,
    option_name: String,
}

impl MysqlOptionStore {
    pub fn new(pool: Pool) -> Result<Self, Error> {
        Self::with_option(pool, DEFAULT_OPTIONS_TABLE, DEFAULT_DB_VERSION_OPTION)
    }

    pub fn from_config(pool: Pool, config: &MigrationsConfig) -> Result<Self, Error> {
        Self::with_option(pool, &config.options_table, &config.db_version_option)
    }

    pub fn with_option(
        pool: Pool,
        table: impl Into<String>,
        option_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
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
}

fn select_sql(table: &str) -> String {
    format!(
        "SELECT option_value FROM {} WHERE option_name = ? LIMIT 1",
        table
    )
}

fn upsert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (option_name, option_value, autoload) VALUES (?, ?, 'yes') \
         ON DUPLICATE KEY UPDATE option_value = VALUES(option_value)",
        table
    )
}

impl VersionStore for MysqlOptionStore {
    fn get_version(&self) -> Result<SchemaVersion, Error> {
        let mut conn = self.pool.get_conn()?;
        let value: Option<String> =
            conn.exec_first(select_sql(&self.table), (self.option_name.as_str(),))?;
        match value {
            Some(value) => normalize_version(&value),
            None => Ok(0),
        }
    }

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error> {
        let mut conn = self.pool.get_conn()?;
        conn.exec_drop(
            upsert_sql(&self.table),
            (self.option_name.as_str(), version.to_string()),
        )?;
        Ok(())
    }
}
