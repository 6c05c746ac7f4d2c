use std::path::PathBuf;

/// Error type for the bookings migrations crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A migration file is missing, is not a regular file, or could not be read.
    #[error("Cannot read migration file \"{}\": {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The database reported an error while executing a migration step.
    /// Carries the driver's error text.
    #[error("{0}")]
    Migration(String),
    #[error("Invalid migrations configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid schema version \"{0}\"")]
    InvalidVersion(String),
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("{0}")]
    Mysql(String),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
}

impl Error {
    /// Wraps a driver error raised while executing migration SQL.
    pub(crate) fn migration(error: impl std::fmt::Display) -> Self {
        Self::Migration(error.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for Error {
    fn from(value: mysql::Error) -> Self {
        Self::Mysql(value.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Self::InvalidConfiguration(value.to_string())
    }
}

// Manual PartialEq implementation because io::Error and postgres::Error don't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::FileRead { path: a, source: x },
                Self::FileRead { path: b, source: y },
            ) => a == b && x.kind() == y.kind(),
            (Self::Migration(a), Self::Migration(b)) => a == b,
            (Self::InvalidConfiguration(a), Self::InvalidConfiguration(b)) => a == b,
            (Self::InvalidVersion(a), Self::InvalidVersion(b)) => a == b,
            #[cfg(feature = "sqlite")]
            (Self::Rusqlite(a), Self::Rusqlite(b)) => a == b,
            #[cfg(feature = "mysql")]
            (Self::Mysql(a), Self::Mysql(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
