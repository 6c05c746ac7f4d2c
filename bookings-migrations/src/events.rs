//! Migration lifecycle notifications.
//!
//! The migrator itself never reports success through a return value to the host. Instead the
//! [AutoMigrationsHandler](crate::AutoMigrationsHandler) publishes named [MigrationEvent]s on an
//! [EventBus], and listeners react to them: persisting the new version after
//! [AFTER_MIGRATION], or showing an error notice after [ON_MIGRATION_FAILED].

use crate::core::{Direction, SchemaVersion};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub const BEFORE_MIGRATION: &str = "wp_bookings_cqrs_before_migration";
pub const AFTER_MIGRATION: &str = "wp_bookings_cqrs_after_migration";
pub const ON_MIGRATION_FAILED: &str = "wp_bookings_cqrs_on_migration_failed";

/// `wp_bookings_cqrs_before_{direction}_migration`
pub fn before_direction(direction: Direction) -> String {
    format!("wp_bookings_cqrs_before_{}_migration", direction)
}

/// `wp_bookings_cqrs_before_{direction}_migration_{target}`
pub fn before_direction_target(direction: Direction, target: SchemaVersion) -> String {
    format!("wp_bookings_cqrs_before_{}_migration_{}", direction, target)
}

/// `wp_bookings_cqrs_before_migration_from_{current}_to_{target}`
pub fn before_transition(current: SchemaVersion, target: SchemaVersion) -> String {
    format!(
        "wp_bookings_cqrs_before_migration_from_{}_to_{}",
        current, target
    )
}

/// `wp_bookings_cqrs_after_{direction}_migration`
pub fn after_direction(direction: Direction) -> String {
    format!("wp_bookings_cqrs_after_{}_migration", direction)
}

/// `wp_bookings_cqrs_after_{direction}_migration_{target}`
pub fn after_direction_target(direction: Direction, target: SchemaVersion) -> String {
    format!("wp_bookings_cqrs_after_{}_migration_{}", direction, target)
}

/// `wp_bookings_cqrs_after_migration_from_{current}_to_{target}`
pub fn after_transition(current: SchemaVersion, target: SchemaVersion) -> String {
    format!(
        "wp_bookings_cqrs_after_migration_from_{}_to_{}",
        current, target
    )
}

/// A named notification about a migration attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationEvent {
    pub name: String,
    pub target: SchemaVersion,
    pub current: SchemaVersion,
    /// The failure message, only set on [ON_MIGRATION_FAILED] events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl MigrationEvent {
    pub fn new(name: impl Into<String>, target: SchemaVersion, current: SchemaVersion) -> Self {
        Self {
            name: name.into(),
            target,
            current,
            error: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.name == ON_MIGRATION_FAILED
    }
}

/// Publishes migration notifications to whoever is listening.
pub trait EventBus {
    fn publish(&self, event: &MigrationEvent);
}

impl<B: EventBus + ?Sized> EventBus for &B {
    fn publish(&self, event: &MigrationEvent) {
        (**self).publish(event)
    }
}

impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    fn publish(&self, event: &MigrationEvent) {
        (**self).publish(event)
    }
}

type Listener = Arc<dyn Fn(&MigrationEvent) + Send + Sync>;

/// An in-process [EventBus] that calls subscribed listeners synchronously, in the order they
/// subscribed.
///
/// Listeners may subscribe further listeners while an event is being published; those are
/// called from the next published event on.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    catch_all: RwLock<Vec<Listener>>,
}

// Manual Debug impl since closures don't implement Debug
impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names = listeners.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("EventDispatcher")
            .field("events", &names)
            .field(
                "catch_all",
                &self
                    .catch_all
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` every time an event named `name` is published.
    pub fn subscribe<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&MigrationEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// Call `listener` for every published event, after the listeners subscribed by name.
    pub fn subscribe_all<F>(&self, listener: F) -> &Self
    where
        F: Fn(&MigrationEvent) + Send + Sync + 'static,
    {
        self.catch_all
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
        self
    }
}

impl EventBus for EventDispatcher {
    fn publish(&self, event: &MigrationEvent) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            event = %event.name,
            target_version = event.target,
            current_version = event.current,
            "Publishing migration event"
        );

        let mut listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.name)
            .cloned()
            .unwrap_or_default();
        listeners.extend(
            self.catch_all
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned(),
        );

        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn event_names_are_bit_exact() {
        assert_eq!(
            before_direction(Direction::Up),
            "wp_bookings_cqrs_before_up_migration"
        );
        assert_eq!(
            before_direction_target(Direction::Down, 3),
            "wp_bookings_cqrs_before_down_migration_3"
        );
        assert_eq!(
            before_transition(5, 3),
            "wp_bookings_cqrs_before_migration_from_5_to_3"
        );
        assert_eq!(
            after_direction(Direction::Down),
            "wp_bookings_cqrs_after_down_migration"
        );
        assert_eq!(
            after_direction_target(Direction::Up, 7),
            "wp_bookings_cqrs_after_up_migration_7"
        );
        assert_eq!(
            after_transition(0, 7),
            "wp_bookings_cqrs_after_migration_from_0_to_7"
        );
    }

    #[test]
    fn dispatches_by_name_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = EventDispatcher::new();

        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        let failures = Arc::clone(&seen);
        dispatcher
            .subscribe(AFTER_MIGRATION, move |e| {
                first.lock().unwrap().push(format!("first:{}", e.target))
            })
            .subscribe(AFTER_MIGRATION, move |e| {
                second.lock().unwrap().push(format!("second:{}", e.target))
            })
            .subscribe(ON_MIGRATION_FAILED, move |e| {
                failures.lock().unwrap().push(format!("failed:{}", e.target))
            });

        dispatcher.publish(&MigrationEvent::new(AFTER_MIGRATION, 4, 2));
        dispatcher.publish(&MigrationEvent::new(BEFORE_MIGRATION, 4, 2));

        assert_eq!(*seen.lock().unwrap(), vec!["first:4", "second:4"]);
    }

    #[test]
    fn catch_all_listeners_see_every_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = EventDispatcher::new();
        let sink = Arc::clone(&seen);
        dispatcher.subscribe_all(move |e| sink.lock().unwrap().push(e.name.clone()));

        dispatcher.publish(&MigrationEvent::new(BEFORE_MIGRATION, 1, 0));
        dispatcher.publish(&MigrationEvent::new(ON_MIGRATION_FAILED, 1, 0).with_error("boom"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![BEFORE_MIGRATION.to_string(), ON_MIGRATION_FAILED.to_string()]
        );
    }

    #[test]
    fn listeners_can_subscribe_while_an_event_is_published() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(EventDispatcher::new());

        let inner = Arc::clone(&dispatcher);
        let sink = Arc::clone(&seen);
        dispatcher.subscribe(BEFORE_MIGRATION, move |_| {
            let by_name = Arc::clone(&sink);
            let catch_all = Arc::clone(&sink);
            inner
                .subscribe(AFTER_MIGRATION, move |e| {
                    by_name.lock().unwrap().push(format!("after:{}", e.target))
                })
                .subscribe_all(move |e| catch_all.lock().unwrap().push(e.name.clone()));
        });

        dispatcher.publish(&MigrationEvent::new(BEFORE_MIGRATION, 2, 1));
        assert!(seen.lock().unwrap().is_empty());

        dispatcher.publish(&MigrationEvent::new(AFTER_MIGRATION, 2, 1));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["after:2".to_string(), AFTER_MIGRATION.to_string()]
        );
    }

    #[test]
    fn serializes_without_empty_error() {
        let event = MigrationEvent::new(AFTER_MIGRATION, 2, 1);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], AFTER_MIGRATION);
        assert_eq!(json["target"], 2);
        assert_eq!(json["current"], 1);
        assert!(json.get("error").is_none());

        let json = serde_json::to_value(event.with_error("boom")).unwrap();
        assert_eq!(json["error"], "boom");
    }
}
