//! Testing utilities for migration development.
//!
//! These doubles stand in for the database, the migrations directory and the event bus, so
//! migration sequencing and handler behavior can be asserted without a live database.
//! Available with the `testing` feature flag.
//!
//! ```
//! # #[cfg(not(feature = "testing"))]
//! # fn main() {}
//! # #[cfg(feature = "testing")]
//! # fn main() {
//! use bookings_migrations::testing::{InMemorySource, RecordingExecutor};
//! use bookings_migrations::Migrator;
//!
//! let source = InMemorySource::new()
//!     .with_file("/migrations/1-up.sql", "CREATE TABLE ${prefix}bookings (id INT);")
//!     .with_file("/migrations/2-up.sql", "CREATE TABLE ${prefix}sessions (id INT);");
//! let mut executor = RecordingExecutor::new();
//!
//! let mut migrator = Migrator::new(&mut executor, "/migrations", 0)
//!     .with_source(source)
//!     .with_placeholder_values(std::collections::HashMap::from([(
//!         "prefix".to_string(),
//!         "wp_".to_string(),
//!     )]));
//! migrator.migrate(2).unwrap();
//! drop(migrator);
//!
//! assert_eq!(
//!     executor.batches(),
//!     &[
//!         "CREATE TABLE wp_bookings (id INT);",
//!         "CREATE TABLE wp_sessions (id INT);",
//!     ]
//! );
//! # }
//! ```

use crate::error::Error;
use crate::events::{EventBus, MigrationEvent};
use crate::executor::SqlBatchExecutor;
use crate::source::MigrationSource;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A [SqlBatchExecutor] that records every batch it is asked to run.
///
/// It can be told to fail a given call, which is how driver errors are simulated.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    batches: Vec<String>,
    transactional_calls: usize,
    fail_on: Option<(usize, String)>,
    supports_transactions: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th batch (counting from 1) with `message` as the driver error.
    /// The failing batch is still recorded as attempted.
    pub fn failing_on(mut self, call: usize, message: impl Into<String>) -> Self {
        self.fail_on = Some((call, message.into()));
        self
    }

    /// Accept [SqlBatchExecutor::execute_batch_in_transaction] calls.
    pub fn with_transactions(mut self) -> Self {
        self.supports_transactions = true;
        self
    }

    /// Every batch attempted so far, in order.
    pub fn batches(&self) -> &[String] {
        &self.batches
    }

    /// The number of batches attempted so far.
    pub fn calls(&self) -> usize {
        self.batches.len()
    }

    /// The number of batches that were run inside a transaction.
    pub fn transactional_calls(&self) -> usize {
        self.transactional_calls
    }

    fn record(&mut self, sql: &str) -> Result<(), Error> {
        self.batches.push(sql.to_string());
        match &self.fail_on {
            Some((call, message)) if *call == self.batches.len() => {
                Err(Error::Migration(message.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl SqlBatchExecutor for RecordingExecutor {
    fn execute_batch(&mut self, sql: &str) -> Result<(), Error> {
        self.record(sql)
    }

    fn execute_batch_in_transaction(&mut self, sql: &str) -> Result<(), Error> {
        if !self.supports_transactions {
            return Err(Error::InvalidConfiguration(
                "recording executor was not configured for transactions".to_string(),
            ));
        }
        self.transactional_calls += 1;
        self.record(sql)
    }
}

/// A [MigrationSource] backed by a map of paths to SQL text. Records every path it is asked for.
#[derive(Debug, Default)]
pub struct InMemorySource {
    files: HashMap<PathBuf, String>,
    reads: Mutex<Vec<PathBuf>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, sql: impl Into<String>) -> Self {
        self.files.insert(path.into(), sql.into());
        self
    }

    /// Every path read so far, in order, including paths that did not exist.
    pub fn reads(&self) -> Vec<PathBuf> {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MigrationSource for InMemorySource {
    fn read(&self, path: &Path) -> Result<String, Error> {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());

        self.files.get(path).cloned().ok_or_else(|| Error::FileRead {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such migration file"),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// An [EventBus] that keeps every published event.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<MigrationEvent>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The names of every published event, in order.
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

impl EventBus for RecordingEventBus {
    fn publish(&self, event: &MigrationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
