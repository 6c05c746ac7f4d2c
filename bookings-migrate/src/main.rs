//! Command line runner for the bookings CQRS schema migrations.
//!
//! Reads a `bookings-migrations.toml` configuration, connects to the database named by
//! `--database-url` (or `DATABASE_URL`) and reports on or runs the migrations.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use bookings_migrations::mysql::MysqlOptionStore;
use bookings_migrations::postgres::PostgresOptionStore;
use bookings_migrations::sqlite::SqliteOptionStore;
use bookings_migrations::{
    pending_step_count, persist_version_on_success, AutoMigrationsHandler, Direction,
    EventDispatcher, MigrationFailureNotice, MigrationOutcome, MigrationStep, MigrationsConfig,
    Migrator, SchemaVersion, SqlBatchExecutor, VersionStore,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bookings-migrate", version, about = "Bookings CQRS database migrations")]
struct Cli {
    /// Migrations configuration file
    #[arg(
        long,
        global = true,
        env = "BOOKINGS_MIGRATIONS_CONFIG",
        default_value = "bookings-migrations.toml"
    )]
    config: PathBuf,

    /// Database to migrate: sqlite://path, mysql://... or postgres://...
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Placeholder value, overriding the configuration file (repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_placeholder)]
    placeholders: Vec<(String, String)>,

    /// Print output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug, PartialEq)]
enum Commands {
    /// Show the stored version, the target version and the pending step count
    Status,
    /// List the migration files that would run, without running them
    Plan {
        /// Version to plan for, instead of target_db_version
        #[arg(long, allow_negative_numbers = true)]
        target: Option<SchemaVersion>,
    },
    /// Run the migrations and store the new version
    Migrate {
        /// Version to migrate to, instead of target_db_version
        #[arg(long, allow_negative_numbers = true)]
        target: Option<SchemaVersion>,
    },
}

impl Commands {
    fn target(&self) -> Option<SchemaVersion> {
        match self {
            Commands::Status => None,
            Commands::Plan { target } | Commands::Migrate { target } => *target,
        }
    }
}

fn parse_placeholder(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got \"{}\"", value)),
    }
}

#[derive(Debug, PartialEq)]
enum Database {
    Sqlite(PathBuf),
    Mysql(String),
    Postgres(String),
}

impl Database {
    fn parse(url: &str) -> Result<Self, String> {
        if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err("sqlite:// URL is missing a database path".to_string());
            }
            Ok(Database::Sqlite(PathBuf::from(path)))
        } else if url.starts_with("mysql://") {
            Ok(Database::Mysql(url.to_string()))
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Database::Postgres(url.to_string()))
        } else {
            Err(format!(
                "Unsupported database URL \"{}\". Expected sqlite://, mysql:// or postgres://",
                url
            ))
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let url = cli
        .database_url
        .as_deref()
        .ok_or("No database given. Pass --database-url or set DATABASE_URL.")?;

    match Database::parse(url)? {
        Database::Sqlite(path) => {
            let store = SqliteOptionStore::from_config(rusqlite::Connection::open(&path)?, &config)?;
            let conn = rusqlite::Connection::open(&path)?;
            run(&cli, &config, conn, Arc::new(store))
        }
        Database::Mysql(url) => {
            let pool = mysql::Pool::new(url.as_str())?;
            let store = MysqlOptionStore::from_config(pool.clone(), &config)?;
            let conn = pool.get_conn()?;
            run(&cli, &config, conn, Arc::new(store))
        }
        Database::Postgres(url) => {
            let store = PostgresOptionStore::from_config(
                postgres::Client::connect(&url, postgres::NoTls)?,
                &config,
            )?;
            let client = postgres::Client::connect(&url, postgres::NoTls)?;
            run(&cli, &config, client, Arc::new(store))
        }
    }
}

fn load_config(cli: &Cli) -> Result<MigrationsConfig, Box<dyn std::error::Error>> {
    let mut config = if cli.config.exists() {
        MigrationsConfig::from_file(&cli.config)?
    } else {
        tracing::warn!(
            path = %cli.config.display(),
            "Configuration file not found, using defaults"
        );
        MigrationsConfig::default()
    };

    for (key, value) in &cli.placeholders {
        config.placeholders.insert(key.clone(), value.clone());
    }
    Ok(config)
}

#[derive(Debug, PartialEq)]
struct PlannedFile {
    step: MigrationStep,
    path: PathBuf,
    exists: bool,
}

/// The files a migration to `target` would run, up to and including the first one that is
/// missing.
fn planned_files<E: SqlBatchExecutor>(
    migrator: &Migrator<E>,
    target: SchemaVersion,
) -> Vec<PlannedFile> {
    let mut files = Vec::new();
    for step in migrator.plan(target) {
        let exists = migrator.has_file(&step);
        files.push(PlannedFile {
            path: migrator.step_path(&step),
            step,
            exists,
        });
        if !exists {
            break;
        }
    }
    files
}

fn run<E, S>(
    cli: &Cli,
    config: &MigrationsConfig,
    executor: E,
    store: Arc<S>,
) -> Result<ExitCode, Box<dyn std::error::Error>>
where
    E: SqlBatchExecutor,
    S: VersionStore + 'static,
{
    let current = store.get_version()?;
    let target = cli.command.target().unwrap_or(config.target_db_version);

    match cli.command {
        Commands::Status => {
            let pending = pending_step_count(current, target);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "current_version": current,
                        "target_version": target,
                        "pending_steps": pending,
                    })
                );
            } else {
                println!("Current version: {}", current);
                println!("Target version:  {}", target);
                if pending == 0 {
                    println!("Schema is up to date.");
                } else {
                    println!(
                        "Pending:         {} {} step(s)",
                        pending,
                        Direction::between(current, target)
                    );
                }
            }
        }
        Commands::Plan { .. } => {
            let migrator = Migrator::from_config(executor, config, current)?;
            let files = planned_files(&migrator, target);
            if cli.json {
                let files = files
                    .iter()
                    .map(|file| {
                        serde_json::json!({
                            "version": file.step.version,
                            "direction": file.step.direction,
                            "path": file.path,
                            "exists": file.exists,
                        })
                    })
                    .collect::<Vec<_>>();
                println!("{}", serde_json::Value::Array(files));
            } else if files.is_empty() {
                println!("Nothing to run, schema is at version {}.", current);
            } else {
                for file in &files {
                    println!("{:<8} {}", file.step.to_string(), file.path.display());
                }
                if let Some(missing) = files.iter().find(|file| !file.exists) {
                    println!(
                        "{} is missing, a migration would stop there.",
                        missing.path.display()
                    );
                }
            }
        }
        Commands::Migrate { .. } => {
            let events = EventDispatcher::new();
            persist_version_on_success(&events, Arc::clone(&store));
            if cli.json {
                events.subscribe_all(|event| match serde_json::to_string(event) {
                    Ok(line) => println!("{}", line),
                    Err(error) => tracing::error!(%error, "Cannot serialize migration event"),
                });
            }

            let migrator = Migrator::from_config(executor, config, current)?;
            let outcome = AutoMigrationsHandler::new(migrator, target, &events)
                .with_notifications(config.notifications)
                .invoke();

            match outcome {
                MigrationOutcome::Succeeded => {
                    if !cli.json {
                        println!("Database schema is at version {}.", store.get_version()?);
                    }
                }
                MigrationOutcome::Failed(message) => {
                    eprintln!("{}", MigrationFailureNotice::new(&message));
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
