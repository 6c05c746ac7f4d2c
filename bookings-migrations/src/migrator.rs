use crate::config::MigrationsConfig;
use crate::core::{plan_steps, AppliedStep, Direction, MigrationStep, PlannedSteps, SchemaVersion};
use crate::error::Error;
use crate::executor::SqlBatchExecutor;
use crate::source::{FileSystemSource, MigrationSource};
use crate::template::{PlaceholderTemplate, PlaceholderValues, SqlRenderer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// The default file name suffix for upward migrations.
pub const UP_MIGRATION_FILENAME: &str = "up.sql";
/// The default file name suffix for downward migrations.
pub const DOWN_MIGRATION_FILENAME: &str = "down.sql";

/// Something that can bring the schema to a target version.
///
/// [AutoMigrationsHandler](crate::AutoMigrationsHandler) depends on this rather than on
/// [Migrator] directly, so that hosts and tests can put their own implementation behind it.
pub trait Migrate {
    /// The schema version migrations start from.
    fn current_version(&self) -> SchemaVersion;

    /// Bring the schema to `target`.
    fn migrate(&mut self, target: SchemaVersion) -> Result<(), Error>;
}

impl<M: Migrate + ?Sized> Migrate for &mut M {
    fn current_version(&self) -> SchemaVersion {
        (**self).current_version()
    }

    fn migrate(&mut self, target: SchemaVersion) -> Result<(), Error> {
        (**self).migrate(target)
    }
}

impl<M: Migrate + ?Sized> Migrate for Box<M> {
    fn current_version(&self) -> SchemaVersion {
        (**self).current_version()
    }

    fn migrate(&mut self, target: SchemaVersion) -> Result<(), Error> {
        (**self).migrate(target)
    }
}

/// Applies versioned SQL migration files to a database.
///
/// For every version between the current and the target version the migrator reads
/// `{migrations_dir}/{version}-up.sql` (or `-down.sql` when going down), replaces placeholder
/// tokens and runs the file as one batch. Steps run strictly in sequence and the first failure
/// stops the run. Steps that already ran are not rolled back.
///
/// The migrator does not persist versions. It takes the current version as a snapshot when it is
/// constructed, and after a successful [Migrator::migrate] the snapshot moves to the target, so
/// repeating the same call does nothing.
pub struct Migrator<E> {
    executor: E,
    migrations_dir: PathBuf,
    current_version: SchemaVersion,
    renderer: Box<dyn SqlRenderer + Send + Sync>,
    placeholder_values: Box<dyn PlaceholderValues + Send + Sync>,
    source: Box<dyn MigrationSource + Send + Sync>,
    up_filename: String,
    down_filename: String,
    transactional_steps: bool,
    on_step_start: Option<Box<dyn Fn(&MigrationStep, &Path) + Send + Sync>>,
    on_step_complete: Option<Box<dyn Fn(&AppliedStep) + Send + Sync>>,
    on_step_error: Option<Box<dyn Fn(&MigrationStep, &Error) + Send + Sync>>,
}

// Manual Debug impl since closures and trait objects don't implement Debug
impl<E> std::fmt::Debug for Migrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations_dir", &self.migrations_dir)
            .field("current_version", &self.current_version)
            .field("up_filename", &self.up_filename)
            .field("down_filename", &self.down_filename)
            .field("transactional_steps", &self.transactional_steps)
            .field("on_step_start", &self.on_step_start.is_some())
            .field("on_step_complete", &self.on_step_complete.is_some())
            .field("on_step_error", &self.on_step_error.is_some())
            .finish()
    }
}

impl<E: SqlBatchExecutor> Migrator<E> {
    /// Create a migrator that reads files from `migrations_dir`, starting at `current_version`.
    ///
    /// Placeholders use the default `${name}` syntax with no values, so every token renders as
    /// an empty string until values are supplied with [Migrator::with_placeholder_values].
    pub fn new(
        executor: E,
        migrations_dir: impl Into<PathBuf>,
        current_version: SchemaVersion,
    ) -> Self {
        Self {
            executor,
            migrations_dir: migrations_dir.into(),
            current_version,
            renderer: Box::new(PlaceholderTemplate::default()),
            placeholder_values: Box::new(BTreeMap::<String, String>::new()),
            source: Box::new(FileSystemSource),
            up_filename: UP_MIGRATION_FILENAME.to_string(),
            down_filename: DOWN_MIGRATION_FILENAME.to_string(),
            transactional_steps: false,
            on_step_start: None,
            on_step_complete: None,
            on_step_error: None,
        }
    }

    /// Create a migrator from a validated [MigrationsConfig].
    /// Returns [Error::InvalidConfiguration] if the configuration is invalid.
    pub fn from_config(
        executor: E,
        config: &MigrationsConfig,
        current_version: SchemaVersion,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self::new(executor, config.migrations_dir.clone(), current_version)
            .with_renderer(config.template()?)
            .with_placeholder_values(config.placeholders.clone())
            .with_up_filename(&config.up_filename)
            .with_down_filename(&config.down_filename)
            .with_transactional_steps(config.transactional_steps))
    }

    /// Set the renderer used to substitute placeholders in migration SQL.
    pub fn with_renderer(mut self, renderer: impl SqlRenderer + Send + Sync + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Set the values that placeholder tokens resolve to.
    pub fn with_placeholder_values(
        mut self,
        values: impl PlaceholderValues + Send + Sync + 'static,
    ) -> Self {
        self.placeholder_values = Box::new(values);
        self
    }

    /// Set where migration files are read from. Defaults to the local file system.
    pub fn with_source(mut self, source: impl MigrationSource + Send + Sync + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Set the file name suffix of upward migrations. Defaults to "up.sql".
    pub fn with_up_filename(mut self, filename: impl Into<String>) -> Self {
        self.up_filename = filename.into();
        self
    }

    /// Set the file name suffix of downward migrations. Defaults to "down.sql".
    ///
    /// Setting this to the up file name makes downgrades re-run the up files, which reproduces
    /// older installations that shipped with that setting.
    pub fn with_down_filename(mut self, filename: impl Into<String>) -> Self {
        self.down_filename = filename.into();
        self
    }

    /// Run each step inside its own transaction. Only supported by databases with transactional
    /// DDL; other connections fail the first step with [Error::InvalidConfiguration].
    pub fn with_transactional_steps(mut self, transactional: bool) -> Self {
        self.transactional_steps = transactional;
        self
    }

    /// Set a callback to be invoked before a step's file is read.
    /// The callback receives the step and the path of its file.
    pub fn on_step_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&MigrationStep, &Path) + Send + Sync + 'static,
    {
        self.on_step_start = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked after a step's SQL has been executed successfully.
    pub fn on_step_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AppliedStep) + Send + Sync + 'static,
    {
        self.on_step_complete = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a step fails.
    /// The callback receives the step and the error that stopped the run.
    pub fn on_step_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&MigrationStep, &Error) + Send + Sync + 'static,
    {
        self.on_step_error = Some(Box::new(callback));
        self
    }

    /// The version the next [Migrator::migrate] call starts from.
    pub fn current_version(&self) -> SchemaVersion {
        self.current_version
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    pub fn up_filename(&self) -> &str {
        &self.up_filename
    }

    pub fn down_filename(&self) -> &str {
        &self.down_filename
    }

    /// Get the underlying connection.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Consume the migrator, returning the underlying connection.
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Preview the steps [Migrator::migrate] would run for `target`, in order, without touching
    /// the database.
    pub fn plan(&self, target: SchemaVersion) -> PlannedSteps {
        plan_steps(self.current_version, target)
    }

    /// Whether the file for `step` is present in the migration source.
    pub fn has_file(&self, step: &MigrationStep) -> bool {
        self.source.exists(&self.step_path(step))
    }

    /// The path of the file that implements `step`.
    pub fn step_path(&self, step: &MigrationStep) -> PathBuf {
        let suffix = match step.direction {
            Direction::Up => &self.up_filename,
            Direction::Down => &self.down_filename,
        };
        self.migrations_dir.join(step.file_name(suffix))
    }

    /// Bring the schema from the current version to `target`.
    ///
    /// Does nothing when `target` equals the current version. Otherwise runs every step between
    /// the two versions in order and stops at the first step that fails, returning its error:
    /// [Error::FileRead] if the step's file can't be read, [Error::Migration] if the database
    /// rejected its SQL.
    pub fn migrate(&mut self, target: SchemaVersion) -> Result<(), Error> {
        let current = self.current_version;
        if target == current {
            #[cfg(feature = "tracing")]
            tracing::debug!(version = current, "Schema is already at the target version");
            return Ok(());
        }

        let steps = self.plan(target);

        #[cfg(feature = "tracing")]
        tracing::info!(
            current_version = current,
            target_version = target,
            direction = %Direction::between(current, target),
            steps = crate::core::pending_step_count(current, target),
            "Migrating database schema"
        );

        for step in steps {
            let path = self.step_path(&step);

            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!(
                "migration_step",
                version = step.version,
                direction = %step.direction
            )
            .entered();

            if let Some(ref callback) = self.on_step_start {
                callback(&step, &path);
            }

            let started = Instant::now();
            match self.apply_file(&path) {
                Ok(checksum) => {
                    let applied = AppliedStep {
                        step,
                        path,
                        checksum,
                        duration: started.elapsed(),
                    };

                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        path = %applied.path.display(),
                        duration_ms = applied.duration.as_millis(),
                        "Migration step completed"
                    );

                    if let Some(ref callback) = self.on_step_complete {
                        callback(&applied);
                    }
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        path = %path.display(),
                        error = %error,
                        "Migration step failed"
                    );

                    if let Some(ref callback) = self.on_step_error {
                        callback(&step, &error);
                    }

                    return Err(error);
                }
            }
        }

        self.current_version = target;
        Ok(())
    }

    /// Read, render and execute a single migration file.
    pub fn run_migration_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.apply_file(path.as_ref()).map(|_| ())
    }

    /// Runs a migration file and returns the checksum of the SQL that was executed.
    fn apply_file(&mut self, path: &Path) -> Result<String, Error> {
        let raw = self.source.read(path)?;
        let sql = self
            .renderer
            .render(&raw, &*self.placeholder_values)?;

        if self.transactional_steps {
            self.executor.execute_batch_in_transaction(&sql)?;
        } else {
            self.executor.execute_batch(&sql)?;
        }

        Ok(format!("{:x}", Sha256::digest(sql.as_bytes())))
    }
}

impl<E: SqlBatchExecutor> Migrate for Migrator<E> {
    fn current_version(&self) -> SchemaVersion {
        self.current_version
    }

    fn migrate(&mut self, target: SchemaVersion) -> Result<(), Error> {
        Migrator::migrate(self, target)
    }
}
