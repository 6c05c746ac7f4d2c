use crate::core::SchemaVersion;
use crate::error::Error;
use crate::events::{EventDispatcher, AFTER_MIGRATION};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Where the applied schema version is kept between runs.
///
/// A store that has never been written reports version 0.
pub trait VersionStore: Send + Sync {
    fn get_version(&self) -> Result<SchemaVersion, Error>;

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error>;
}

impl<S: VersionStore + ?Sized> VersionStore for Arc<S> {
    fn get_version(&self) -> Result<SchemaVersion, Error> {
        (**self).get_version()
    }

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error> {
        (**self).set_version(version)
    }
}

impl<S: VersionStore + ?Sized> VersionStore for Box<S> {
    fn get_version(&self) -> Result<SchemaVersion, Error> {
        (**self).get_version()
    }

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error> {
        (**self).set_version(version)
    }
}

/// A process-local [VersionStore].
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    version: AtomicI64,
}

impl InMemoryVersionStore {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version: AtomicI64::new(version),
        }
    }
}

impl VersionStore for InMemoryVersionStore {
    fn get_version(&self) -> Result<SchemaVersion, Error> {
        Ok(self.version.load(Ordering::SeqCst))
    }

    fn set_version(&self, version: SchemaVersion) -> Result<(), Error> {
        self.version.store(version, Ordering::SeqCst);
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted.
#[cfg_attr(
    not(any(feature = "sqlite", feature = "mysql", feature = "postgres")),
    allow(dead_code)
)]
pub(crate) fn validate_table_name(table: &str) -> Result<(), Error> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "\"{}\" is not a valid options table name",
            table
        )))
    }
}

/// Write the target version of every successful migration to `store`.
///
/// Subscribes to [AFTER_MIGRATION] on `dispatcher`. Listeners cannot return errors, so a failed
/// write is logged and the stored version stays where it was; the next run then migrates from
/// the old version again.
pub fn persist_version_on_success<S>(dispatcher: &EventDispatcher, store: Arc<S>)
where
    S: VersionStore + ?Sized + 'static,
{
    dispatcher.subscribe(AFTER_MIGRATION, move |event| {
        match store.set_version(event.target) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!(version = event.target, "Stored database schema version");
            }
            Err(_error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    version = event.target,
                    error = %_error,
                    "Failed to store database schema version"
                );
            }
        }
    });
}
