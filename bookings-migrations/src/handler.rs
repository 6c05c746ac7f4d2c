use crate::core::{Direction, SchemaVersion};
use crate::events::{self, EventBus, MigrationEvent};
use crate::migrator::Migrate;
use serde::{Deserialize, Serialize};

/// How much the [AutoMigrationsHandler] tells listeners about a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notifications {
    /// Only the generic before and after notifications.
    Basic,
    /// The generic notifications plus direction, target and transition specific ones.
    ///
    /// When the schema is already at the target version only the generic pair is published,
    /// so nothing named `..._migration_from_{n}_to_{n}` or `..._down_migration_{n}` is ever
    /// sent for a run that has nothing to do.
    #[default]
    Detailed,
}

/// The result of one [AutoMigrationsHandler::invoke] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Succeeded,
    /// The migration stopped with this error message.
    Failed(String),
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Runs migrations up to the version the installed code expects and tells the rest of the
/// application how it went.
///
/// The handler is the boundary where migration errors stop. Listeners on the [EventBus] learn
/// about the outcome through [events::AFTER_MIGRATION] or [events::ON_MIGRATION_FAILED], and
/// [AutoMigrationsHandler::invoke] never returns an error.
#[derive(Debug)]
pub struct AutoMigrationsHandler<M, B> {
    migrator: M,
    target: SchemaVersion,
    events: B,
    notifications: Notifications,
}

impl<M: Migrate, B: EventBus> AutoMigrationsHandler<M, B> {
    pub fn new(migrator: M, target: SchemaVersion, events: B) -> Self {
        Self {
            migrator,
            target,
            events,
            notifications: Notifications::default(),
        }
    }

    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn target(&self) -> SchemaVersion {
        self.target
    }

    pub fn migrator(&self) -> &M {
        &self.migrator
    }

    pub fn events(&self) -> &B {
        &self.events
    }

    /// Consume the handler, returning the migrator.
    pub fn into_migrator(self) -> M {
        self.migrator
    }

    /// Migrate to the target version.
    ///
    /// Publishes the before notifications, runs the migration, then publishes either the after
    /// notifications (most specific first, generic last) or a single failure notification
    /// carrying the error text.
    pub fn invoke(&mut self) -> MigrationOutcome {
        let target = self.target;
        let current = self.migrator.current_version();
        let direction = Direction::between(current, target);
        let names = self.notification_names(direction, current, target);

        #[cfg(feature = "tracing")]
        tracing::info!(
            current_version = current,
            target_version = target,
            direction = %direction,
            "Running automatic migrations"
        );

        for name in &names.before {
            self.publish(name, current);
        }

        match self.migrator.migrate(target) {
            Ok(()) => {
                for name in &names.after {
                    self.publish(name, current);
                }

                #[cfg(feature = "tracing")]
                tracing::info!(version = target, "Database schema is up to date");

                MigrationOutcome::Succeeded
            }
            Err(error) => {
                let message = error.to_string();

                #[cfg(feature = "tracing")]
                tracing::error!(
                    current_version = current,
                    target_version = target,
                    error = %message,
                    "Automatic migration failed"
                );

                self.events.publish(
                    &MigrationEvent::new(events::ON_MIGRATION_FAILED, target, current)
                        .with_error(message.clone()),
                );
                MigrationOutcome::Failed(message)
            }
        }
    }

    fn publish(&self, name: &str, current: SchemaVersion) {
        self.events
            .publish(&MigrationEvent::new(name, self.target, current));
    }

    fn notification_names(
        &self,
        direction: Direction,
        current: SchemaVersion,
        target: SchemaVersion,
    ) -> NotificationNames {
        let mut before = vec![events::BEFORE_MIGRATION.to_string()];
        let mut after = Vec::new();

        if self.notifications == Notifications::Detailed && current != target {
            before.push(events::before_direction(direction));
            before.push(events::before_direction_target(direction, target));
            before.push(events::before_transition(current, target));

            after.push(events::after_transition(current, target));
            after.push(events::after_direction_target(direction, target));
            after.push(events::after_direction(direction));
        }
        after.push(events::AFTER_MIGRATION.to_string());

        NotificationNames { before, after }
    }
}

struct NotificationNames {
    before: Vec<String>,
    after: Vec<String>,
}
