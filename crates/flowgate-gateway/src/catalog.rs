//! Static table of forwarded lifecycle events.
//!
//! Each entry maps a backend message path to the wire path pushed to
//! clients, together with its delivery scope. `{user_id}` in either path
//! is substituted when an identity scope is created;
//! `{process_model_id}` in a wire path is substituted per message from
//! the payload.

use flowgate_core::messages::paths;

/// Who receives a forwarded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every currently open channel.
    Global,
    /// Only the channels of one identity.
    PerIdentity,
}

/// The forwarded event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A user task is waiting, broadcast.
    UserTaskWaiting,
    /// A user task finished, broadcast.
    UserTaskFinished,
    /// A manual task is waiting, broadcast.
    ManualTaskWaiting,
    /// A manual task finished, broadcast.
    ManualTaskFinished,
    /// A process instance started, broadcast.
    ProcessStarted,
    /// A process instance started, broadcast on a per-model wire path.
    ProcessInstanceStarted,
    /// A process instance ended, broadcast.
    ProcessEnded,
    /// A process instance was terminated, broadcast.
    ProcessTerminated,
    /// A user task for one identity is waiting.
    UserTaskForIdentityWaiting,
    /// A user task for one identity finished.
    UserTaskForIdentityFinished,
    /// A manual task for one identity is waiting.
    ManualTaskForIdentityWaiting,
    /// A manual task for one identity finished.
    ManualTaskForIdentityFinished,
}

/// One row of the catalog.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    /// The forwarded event kind.
    pub kind: EventKind,
    /// Event-bus path (template for `PerIdentity` entries).
    pub message_path: &'static str,
    /// Wire path pushed to clients (template).
    pub wire_path: &'static str,
    /// Delivery scope.
    pub scope: Scope,
}

/// The standard catalog: every lifecycle event the gateway forwards.
///
/// `process.started` appears twice on purpose: one backend message
/// produces both the plain broadcast and the per-model wire event.
pub const STANDARD_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        kind: EventKind::UserTaskWaiting,
        message_path: paths::USER_TASK_REACHED,
        wire_path: "user_task_waiting",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::UserTaskFinished,
        message_path: paths::USER_TASK_FINISHED,
        wire_path: "user_task_finished",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::ManualTaskWaiting,
        message_path: paths::MANUAL_TASK_REACHED,
        wire_path: "manual_task_waiting",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::ManualTaskFinished,
        message_path: paths::MANUAL_TASK_FINISHED,
        wire_path: "manual_task_finished",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::ProcessStarted,
        message_path: paths::PROCESS_STARTED,
        wire_path: "process_started",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::ProcessInstanceStarted,
        message_path: paths::PROCESS_STARTED,
        wire_path: "process_started/{process_model_id}",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::ProcessEnded,
        message_path: paths::PROCESS_ENDED,
        wire_path: "process_ended",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::ProcessTerminated,
        message_path: paths::PROCESS_TERMINATED,
        wire_path: "process_terminated",
        scope: Scope::Global,
    },
    CatalogEntry {
        kind: EventKind::UserTaskForIdentityWaiting,
        message_path: "user_task.reached/{user_id}",
        wire_path: "user_task_for_identity_waiting/{user_id}",
        scope: Scope::PerIdentity,
    },
    CatalogEntry {
        kind: EventKind::UserTaskForIdentityFinished,
        message_path: "user_task.finished/{user_id}",
        wire_path: "user_task_for_identity_finished/{user_id}",
        scope: Scope::PerIdentity,
    },
    CatalogEntry {
        kind: EventKind::ManualTaskForIdentityWaiting,
        message_path: "manual_task.reached/{user_id}",
        wire_path: "manual_task_for_identity_waiting/{user_id}",
        scope: Scope::PerIdentity,
    },
    CatalogEntry {
        kind: EventKind::ManualTaskForIdentityFinished,
        message_path: "manual_task.finished/{user_id}",
        wire_path: "manual_task_for_identity_finished/{user_id}",
        scope: Scope::PerIdentity,
    },
];

/// Read-only view over a catalog table.
#[derive(Debug, Clone, Copy)]
pub struct EventCatalog {
    entries: &'static [CatalogEntry],
}

impl EventCatalog {
    /// The standard production catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_CATALOG,
        }
    }

    /// A catalog over a custom table (tests, reduced deployments).
    #[must_use]
    pub fn from_entries(entries: &'static [CatalogEntry]) -> Self {
        Self { entries }
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }

    /// Entries delivered to every channel.
    pub fn global(&self) -> impl Iterator<Item = &'static CatalogEntry> {
        self.entries.iter().filter(|e| e.scope == Scope::Global)
    }

    /// Entries delivered per identity.
    pub fn per_identity(&self) -> impl Iterator<Item = &'static CatalogEntry> {
        self.entries.iter().filter(|e| e.scope == Scope::PerIdentity)
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_has_all_kinds_once() {
        use std::collections::HashSet;
        let kinds: HashSet<_> = STANDARD_CATALOG.iter().map(|e| e.kind).collect();
        assert_eq!(kinds.len(), STANDARD_CATALOG.len());
    }

    #[test]
    fn global_and_identity_partition_the_catalog() {
        let catalog = EventCatalog::standard();
        let total = catalog.global().count() + catalog.per_identity().count();
        assert_eq!(total, catalog.entries().len());
        assert_eq!(catalog.global().count(), 8);
        assert_eq!(catalog.per_identity().count(), 4);
    }

    #[test]
    fn identity_entries_are_user_templates() {
        for entry in EventCatalog::standard().per_identity() {
            assert!(
                entry.message_path.contains("{user_id}"),
                "{:?} message path must scope by user",
                entry.kind
            );
            assert!(
                entry.wire_path.contains("{user_id}"),
                "{:?} wire path must scope by user",
                entry.kind
            );
        }
    }

    #[test]
    fn process_started_fans_out_twice() {
        let on_started: Vec<_> = STANDARD_CATALOG
            .iter()
            .filter(|e| e.message_path == paths::PROCESS_STARTED)
            .collect();
        assert_eq!(on_started.len(), 2);
        assert!(on_started.iter().any(|e| e.wire_path == "process_started"));
        assert!(
            on_started
                .iter()
                .any(|e| e.wire_path.contains("{process_model_id}"))
        );
    }

    #[test]
    fn global_wire_paths_never_reference_users() {
        for entry in EventCatalog::standard().global() {
            assert!(!entry.wire_path.contains("{user_id}"));
        }
    }
}
