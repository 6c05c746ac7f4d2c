//! Typed migration settings.
//!
//! Every setting has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! migrations_dir = "migrations"
//! target_db_version = 3
//! db_version_option = "wp_bookings_cqrs_db_version"
//! options_table = "wp_options"
//! placeholder_token_start = "${"
//! placeholder_token_end = "}"
//! placeholder_default_value = ""
//! up_filename = "up.sql"
//! down_filename = "down.sql"
//! transactional_steps = false
//! notifications = "detailed"
//!
//! [placeholders]
//! prefix = "wp_eddbk_"
//! ```

use crate::core::{normalize_version, SchemaVersion};
use crate::error::Error;
use crate::handler::Notifications;
use crate::migrator::{DOWN_MIGRATION_FILENAME, UP_MIGRATION_FILENAME};
use crate::template::{
    PlaceholderTemplate, DEFAULT_PLACEHOLDER_VALUE, DEFAULT_TOKEN_END, DEFAULT_TOKEN_START,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_VERSION_OPTION: &str = "wp_bookings_cqrs_db_version";
pub const DEFAULT_OPTIONS_TABLE: &str = "wp_options";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory holding the `{version}-up.sql` / `{version}-down.sql` files.
    pub migrations_dir: PathBuf,
    /// The schema version this release expects. Accepts an integer or a numeric string.
    #[serde(deserialize_with = "deserialize_version")]
    pub target_db_version: SchemaVersion,
    /// Name of the option the applied version is stored under.
    pub db_version_option: String,
    /// Table the version option lives in.
    pub options_table: String,
    pub placeholder_token_start: String,
    pub placeholder_token_end: String,
    /// Replacement for tokens that have no value in `placeholders`.
    pub placeholder_default_value: String,
    pub up_filename: String,
    pub down_filename: String,
    /// Run every step inside its own transaction.
    pub transactional_steps: bool,
    pub notifications: Notifications,
    /// Values for placeholder tokens, by token name.
    pub placeholders: BTreeMap<String, String>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            target_db_version: 0,
            db_version_option: DEFAULT_DB_VERSION_OPTION.to_string(),
            options_table: DEFAULT_OPTIONS_TABLE.to_string(),
            placeholder_token_start: DEFAULT_TOKEN_START.to_string(),
            placeholder_token_end: DEFAULT_TOKEN_END.to_string(),
            placeholder_default_value: DEFAULT_PLACEHOLDER_VALUE.to_string(),
            up_filename: UP_MIGRATION_FILENAME.to_string(),
            down_filename: DOWN_MIGRATION_FILENAME.to_string(),
            transactional_steps: false,
            notifications: Notifications::default(),
            placeholders: BTreeMap::new(),
        }
    }
}

impl MigrationsConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// A relative `migrations_dir` is resolved against the directory containing the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if config.migrations_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.migrations_dir = parent.join(&config.migrations_dir);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "Loaded migrations configuration");

        Ok(config)
    }

    /// Check the settings that would make every migration fail.
    pub fn validate(&self) -> Result<(), Error> {
        if self.up_filename.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "up_filename must not be empty".to_string(),
            ));
        }
        if self.down_filename.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "down_filename must not be empty".to_string(),
            ));
        }
        if self.db_version_option.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "db_version_option must not be empty".to_string(),
            ));
        }
        self.template().map(|_| ())
    }

    /// The placeholder template described by the token settings.
    pub fn template(&self) -> Result<PlaceholderTemplate, Error> {
        PlaceholderTemplate::try_new(
            &self.placeholder_token_start,
            &self.placeholder_token_end,
            &self.placeholder_default_value,
        )
    }
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<SchemaVersion, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawVersion {
        Integer(SchemaVersion),
        Float(f64),
        Text(String),
    }

    match RawVersion::deserialize(deserializer)? {
        RawVersion::Integer(version) => Ok(version),
        RawVersion::Float(version) => normalize_version(&version.to_string()),
        RawVersion::Text(version) => normalize_version(&version),
    }
    .map_err(serde::de::Error::custom)
}
