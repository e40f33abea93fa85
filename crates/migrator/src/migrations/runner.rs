//! Migration Runner - Executes migrations against the database
//!
//! A runner is one migration session: it owns the connection, the registry
//! and the ledger accessor. Each unit runs in its own transaction together
//! with its ledger update, and a failing unit never stops the run.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use sqlx::{AnyConnection, Connection};

use super::definitions::{
    FailedMigration, MigrationRunResult, MigrationStatus, MigrationStatusEntry, StatusReport,
};
use super::ledger::Ledger;
use super::registry::MigrationRegistry;
use super::unit::Migration;
use crate::config::MigrationConfig;
use crate::error::{database_message, MigrationError, MigrationResult};
use crate::events::{EventSink, MigrationEvent, TracingSink};

/// Migration session bound to one database connection
pub struct MigrationRunner {
    pub(super) conn: AnyConnection,
    pub(super) registry: MigrationRegistry,
    pub(super) ledger: Ledger,
    pub(super) sink: Box<dyn EventSink>,
}

impl MigrationRunner {
    /// Start a session on an open connection
    ///
    /// Creates the ledger table if needed; failure there is fatal and
    /// reported as [`MigrationError::SchemaInit`].
    pub async fn new(
        mut conn: AnyConnection,
        registry: MigrationRegistry,
        ledger: Ledger,
    ) -> MigrationResult<Self> {
        ledger.ensure_schema(&mut conn).await?;

        Ok(Self {
            conn,
            registry,
            ledger,
            sink: Box::new(TracingSink),
        })
    }

    /// Connect to `config.database_url` and start a session
    pub async fn connect(config: &MigrationConfig, registry: MigrationRegistry) -> MigrationResult<Self> {
        config.validate()?;
        let ledger = Ledger::from_config(config)?;

        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect(&config.database_url)
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to connect to database: {}", e)))?;

        tracing::debug!(
            "Connected to {} database, ledger table '{}'",
            conn.backend_name(),
            ledger.table()
        );

        Self::new(conn, registry, ledger).await
    }

    /// Send events to `sink` instead of the log
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The session connection, e.g. for inspecting the schema after a run
    pub fn connection(&mut self) -> &mut AnyConnection {
        &mut self.conn
    }

    /// Apply every registered migration that the ledger does not list yet
    ///
    /// The applied set is read once up front. Units run in registration
    /// order; a failed unit is rolled back, reported, and the run continues.
    pub async fn migrate(&mut self) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        let applied: HashSet<String> = self
            .ledger
            .list_applied(&mut self.conn)
            .await?
            .into_iter()
            .collect();

        let mut result = MigrationRunResult::default();

        for entry in self.registry.iter() {
            let name = entry.name();
            if applied.contains(name) {
                tracing::debug!("Skipping already applied migration: {}", name);
                result.skipped_count += 1;
                continue;
            }

            tracing::debug!("Applying migration: {}", name);
            let event = match apply_migration(&mut self.conn, &self.ledger, name, entry.migration()).await {
                Ok(()) => {
                    result.applied.push(name.to_string());
                    MigrationEvent::Applied {
                        migration: name.to_string(),
                    }
                }
                Err(err) => {
                    let error = err.to_string();
                    result.failed.push(FailedMigration {
                        migration: name.to_string(),
                        error: error.clone(),
                    });
                    MigrationEvent::ApplyFailed {
                        migration: name.to_string(),
                        error,
                    }
                }
            };
            self.sink.emit(&event).await;
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        tracing::info!(
            "Migration run finished: {} applied, {} failed, {} skipped in {}ms",
            result.applied.len(),
            result.failed.len(),
            result.skipped_count,
            result.execution_time_ms
        );

        Ok(result)
    }

    /// Get migration status for all registered migrations
    pub async fn status(&mut self) -> MigrationResult<StatusReport> {
        let entries = self.ledger.entries(&mut self.conn).await?;

        let mut applied_at = HashMap::new();
        for entry in &entries {
            applied_at.entry(entry.migration.as_str()).or_insert(entry.applied_at);
        }

        let migrations = self
            .registry
            .iter()
            .map(|m| MigrationStatusEntry {
                name: m.name().to_string(),
                status: match applied_at.get(m.name()) {
                    Some(at) => MigrationStatus::Applied { applied_at: *at },
                    None => MigrationStatus::Pending,
                },
            })
            .collect();

        let orphaned = entries
            .iter()
            .filter(|entry| !self.registry.contains(&entry.migration))
            .cloned()
            .collect();

        Ok(StatusReport {
            migrations,
            orphaned,
        })
    }

    /// Close the underlying connection
    pub async fn close(self) -> MigrationResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to close connection: {}", e)))
    }
}

/// Run `up` and record the ledger entry in one transaction
async fn apply_migration(
    conn: &mut AnyConnection,
    ledger: &Ledger,
    name: &str,
    migration: &dyn Migration,
) -> MigrationResult<()> {
    let mut transaction = conn
        .begin()
        .await
        .map_err(|e| MigrationError::Transaction(format!("Failed to start transaction: {}", e)))?;

    let outcome = match migration.up(&mut *transaction).await {
        Ok(()) => ledger.record(&mut *transaction, name).await,
        Err(err) => Err(unit_error(err, |message| MigrationError::Apply {
            migration: name.to_string(),
            message,
        })),
    };

    finish_transaction(transaction, name, outcome).await
}

/// Commit on success, roll back on failure
pub(super) async fn finish_transaction(
    transaction: sqlx::Transaction<'_, sqlx::Any>,
    name: &str,
    outcome: MigrationResult<()>,
) -> MigrationResult<()> {
    match outcome {
        Ok(()) => transaction.commit().await.map_err(|e| {
            MigrationError::Transaction(format!("Failed to commit migration {}: {}", name, e))
        }),
        Err(err) => {
            if let Err(rollback_err) = transaction.rollback().await {
                tracing::warn!("Failed to roll back transaction for {}: {}", name, rollback_err);
            }
            Err(err)
        }
    }
}

/// Wrap an error raised by a unit, keeping the driver's own message
pub(super) fn unit_error(
    err: MigrationError,
    wrap: impl FnOnce(String) -> MigrationError,
) -> MigrationError {
    match err {
        MigrationError::Apply { .. } | MigrationError::Revert { .. } => err,
        MigrationError::Database(db_err) => wrap(database_message(&db_err)),
        other => wrap(other.to_string()),
    }
}
