//! Migration events
//!
//! The runner emits exactly one event per unit outcome. Sinks decide what to
//! do with them; the default one writes them to the `tracing` log.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    Applied { migration: String },
    ApplyFailed { migration: String, error: String },
    RolledBack { migration: String },
    RollbackFailed { migration: String, error: String },
    /// The ledger's most recent entry has no registered unit to revert it
    RollbackTargetMissing { migration: String },
}

impl MigrationEvent {
    pub fn migration(&self) -> &str {
        match self {
            MigrationEvent::Applied { migration }
            | MigrationEvent::ApplyFailed { migration, .. }
            | MigrationEvent::RolledBack { migration }
            | MigrationEvent::RollbackFailed { migration, .. }
            | MigrationEvent::RollbackTargetMissing { migration } => migration,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            MigrationEvent::Applied { .. } | MigrationEvent::RolledBack { .. }
        )
    }
}

impl fmt::Display for MigrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationEvent::Applied { migration } => write!(f, "Migrated: {}", migration),
            MigrationEvent::ApplyFailed { migration, error } => {
                write!(f, "Error in migration {}: {}", migration, error)
            }
            MigrationEvent::RolledBack { migration } => write!(f, "Rolled back: {}", migration),
            MigrationEvent::RollbackFailed { migration, error } => {
                write!(f, "Error in rollback {}: {}", migration, error)
            }
            MigrationEvent::RollbackTargetMissing { migration } => {
                write!(f, "No registered migration found for rollback: {}", migration)
            }
        }
    }
}

/// Receives migration events as they happen
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &MigrationEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: &MigrationEvent) {
        match event {
            MigrationEvent::Applied { .. } | MigrationEvent::RolledBack { .. } => {
                tracing::info!(migration = event.migration(), "{}", event);
            }
            MigrationEvent::RollbackTargetMissing { .. } => {
                tracing::warn!(migration = event.migration(), "{}", event);
            }
            MigrationEvent::ApplyFailed { .. } | MigrationEvent::RollbackFailed { .. } => {
                tracing::error!(migration = event.migration(), "{}", event);
            }
        }
    }
}

/// Keeps events in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<MigrationEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, event: &MigrationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_lines() {
        let applied = MigrationEvent::Applied {
            migration: "create_users".to_string(),
        };
        assert_eq!(applied.to_string(), "Migrated: create_users");
        assert!(!applied.is_failure());

        let failed = MigrationEvent::ApplyFailed {
            migration: "create_users".to_string(),
            error: "syntax error".to_string(),
        };
        assert_eq!(failed.to_string(), "Error in migration create_users: syntax error");
        assert!(failed.is_failure());

        let rolled_back = MigrationEvent::RolledBack {
            migration: "create_users".to_string(),
        };
        assert_eq!(rolled_back.to_string(), "Rolled back: create_users");

        let rollback_failed = MigrationEvent::RollbackFailed {
            migration: "create_users".to_string(),
            error: "no such table".to_string(),
        };
        assert_eq!(rollback_failed.to_string(), "Error in rollback create_users: no such table");

        let missing = MigrationEvent::RollbackTargetMissing {
            migration: "gone".to_string(),
        };
        assert_eq!(missing.migration(), "gone");
        assert!(missing.is_failure());
    }

    #[tokio::test]
    async fn test_memory_sink_shares_buffer_between_clones() {
        let sink = MemorySink::new();
        let handle = sink.clone();

        sink.emit(&MigrationEvent::Applied {
            migration: "a".to_string(),
        })
        .await;

        assert_eq!(handle.events().len(), 1);
        handle.clear();
        assert!(sink.events().is_empty());
    }
}
