use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// A schema version number. Zero and negative values mean that no migration has been applied yet.
pub type SchemaVersion = i64;

/// The lowest version migration ranges are clamped to.
/// Version 0 is the state before the first migration, so the first file to run is `1-up.sql`.
pub const VERSION_FLOOR: SchemaVersion = 0;

/// The direction of a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Upgrading to a newer schema version.
    Up,
    /// Downgrading to an older schema version.
    Down,
}

impl Direction {
    /// The direction needed to get from `current` to `target`.
    /// A zero difference is reported as [Direction::Down].
    pub fn between(current: SchemaVersion, target: SchemaVersion) -> Self {
        if target > current {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single versioned, directional unit of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationStep {
    pub version: SchemaVersion,
    pub direction: Direction,
}

impl MigrationStep {
    pub fn up(version: SchemaVersion) -> Self {
        Self {
            version,
            direction: Direction::Up,
        }
    }

    pub fn down(version: SchemaVersion) -> Self {
        Self {
            version,
            direction: Direction::Down,
        }
    }

    /// The file name for this step, given the file name suffix for its direction.
    pub fn file_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.version, suffix)
    }
}

impl std::fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.direction, self.version)
    }
}

/// A step that was executed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedStep {
    pub step: MigrationStep,
    /// The migration file that was executed.
    pub path: PathBuf,
    /// SHA-256 of the SQL that was sent to the database, after placeholder substitution.
    pub checksum: String,
    pub duration: Duration,
}

/// The steps between two versions, produced one at a time by [plan_steps].
#[derive(Debug, Clone)]
pub struct PlannedSteps {
    direction: Direction,
    versions: RangeInclusive<SchemaVersion>,
}

impl Iterator for PlannedSteps {
    type Item = MigrationStep;

    fn next(&mut self) -> Option<MigrationStep> {
        let version = match self.direction {
            Direction::Up => self.versions.next()?,
            Direction::Down => self.versions.next_back()?,
        };
        Some(MigrationStep {
            version,
            direction: self.direction,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.versions.size_hint()
    }
}

impl FusedIterator for PlannedSteps {}

/// The steps that take the schema from `current` to `target`, in order.
///
/// Both bounds are clamped to [VERSION_FLOOR] first. Upward plans visit
/// `current + 1 ..= target` in ascending order, downward plans visit
/// `current ..= target + 1` in descending order, so version `n` is always undone by
/// `n-down.sql` and re-applied by `n-up.sql`.
pub fn plan_steps(current: SchemaVersion, target: SchemaVersion) -> PlannedSteps {
    let direction = Direction::between(current, target);
    if target == current {
        return PlannedSteps {
            direction,
            versions: 1..=0,
        };
    }

    let current = current.max(VERSION_FLOOR);
    let target = target.max(VERSION_FLOOR);
    let versions = match direction {
        Direction::Up => (current + 1)..=target,
        Direction::Down => (target + 1)..=current,
    };

    PlannedSteps {
        direction,
        versions,
    }
}

/// The number of steps [plan_steps] yields for `current` and `target`, without walking them.
pub fn pending_step_count(current: SchemaVersion, target: SchemaVersion) -> u64 {
    if target == current {
        return 0;
    }
    current
        .max(VERSION_FLOOR)
        .abs_diff(target.max(VERSION_FLOOR))
}

/// Normalizes a textual version number to a [SchemaVersion].
///
/// Surrounding whitespace is ignored and an empty value means version 0. Decimal values are
/// truncated toward zero.
pub fn normalize_version(value: &str) -> Result<SchemaVersion, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    if let Ok(version) = trimmed.parse::<SchemaVersion>() {
        return Ok(version);
    }

    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number.trunc() as SchemaVersion),
        _ => Err(Error::InvalidVersion(value.to_string())),
    }
}
