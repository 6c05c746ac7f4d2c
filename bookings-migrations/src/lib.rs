//! Versioned SQL schema migrations for the EDD Bookings CQRS storage layer.
//!
//! Schema changes ship as plain SQL files named `{version}-up.sql` and `{version}-down.sql`.
//! The [Migrator] walks from the installed schema version to the version the code expects,
//! one file at a time, substituting `${name}` placeholders (table prefixes and the like) before
//! each file runs. The [AutoMigrationsHandler] wraps a run in lifecycle notifications so that
//! persisting the new version and reporting failures happen in listeners, not in the migrator.
//!
//! ```
//! # #[cfg(not(feature = "testing"))]
//! # fn main() {}
//! # #[cfg(feature = "testing")]
//! # fn main() {
//! use bookings_migrations::testing::{InMemorySource, RecordingEventBus, RecordingExecutor};
//! use bookings_migrations::{AutoMigrationsHandler, MigrationOutcome, Migrator};
//! use std::collections::HashMap;
//!
//! let source = InMemorySource::new()
//!     .with_file("/plugin/migrations/1-up.sql", "CREATE TABLE ${prefix}bookings (id INT);")
//!     .with_file("/plugin/migrations/2-up.sql", "CREATE TABLE ${prefix}sessions (id INT);");
//! let migrator = Migrator::new(RecordingExecutor::new(), "/plugin/migrations", 0)
//!     .with_source(source)
//!     .with_placeholder_values(HashMap::from([("prefix".to_string(), "wp_eddbk_".to_string())]));
//!
//! let events = RecordingEventBus::new();
//! let mut handler = AutoMigrationsHandler::new(migrator, 2, &events);
//! assert_eq!(handler.invoke(), MigrationOutcome::Succeeded);
//!
//! assert_eq!(
//!     handler.migrator().executor().batches(),
//!     &[
//!         "CREATE TABLE wp_eddbk_bookings (id INT);",
//!         "CREATE TABLE wp_eddbk_sessions (id INT);",
//!     ]
//! );
//! assert_eq!(
//!     events.names().last().map(String::as_str),
//!     Some("wp_bookings_cqrs_after_migration")
//! );
//! # }
//! ```
//!
//! The example uses the test doubles from the `testing` feature. Real runs pass a database
//! connection as the executor; see the `sqlite`, `mysql` and `postgres` modules.
//!
//! # Versions
//!
//! Version 0 means no migration has been applied. Going up from `current` to `target` runs
//! `current + 1 ..= target` ascending; going down runs `target + 1 ..= current` descending, after
//! both bounds are clamped at 0. The first failing step stops the run and nothing is rolled back
//! unless transactional steps are enabled on a database that supports them.
//!
//! # Feature flags
//!
//! - `sqlite` (default): `rusqlite` connections and options table.
//! - `mysql`: `mysql` connections and the WordPress options table.
//! - `postgres`: `postgres` clients and options table.
//! - `tracing` (default): log runs and steps through `tracing`.
//! - `testing`: recording test doubles in `testing`.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod core;
pub use crate::core::{
    normalize_version, pending_step_count, plan_steps, AppliedStep, Direction, MigrationStep,
    PlannedSteps, SchemaVersion, VERSION_FLOOR,
};

mod error;
pub use error::Error;

pub mod config;
pub use config::MigrationsConfig;

pub mod events;
pub use events::{EventBus, EventDispatcher, MigrationEvent};

mod executor;
pub use executor::SqlBatchExecutor;

mod handler;
pub use handler::{AutoMigrationsHandler, MigrationOutcome, Notifications};

mod migrator;
pub use migrator::{Migrate, Migrator, DOWN_MIGRATION_FILENAME, UP_MIGRATION_FILENAME};

mod notice;
pub use notice::MigrationFailureNotice;

mod source;
pub use source::{FileSystemSource, MigrationSource};

mod store;
pub use store::{persist_version_on_success, InMemoryVersionStore, VersionStore};

pub mod template;
pub use template::{PlaceholderTemplate, PlaceholderValues, SqlRenderer};

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub mod mysql;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(all(test, feature = "mysql"))]
pub(crate) mod test_mysql;

#[cfg(all(test, feature = "postgres"))]
pub(crate) mod test_postgres;
