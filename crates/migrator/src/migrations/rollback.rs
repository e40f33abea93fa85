//! Migration Rollback - Reverts the most recently applied migration
//!
//! Only the newest ledger entry can be targeted. Reverting something further
//! back means rolling back everything applied after it first.

use std::time::Instant;

use sqlx::{AnyConnection, Connection};

use super::definitions::{RollbackOutcome, RollbackResult};
use super::ledger::Ledger;
use super::runner::{finish_transaction, unit_error, MigrationRunner};
use super::unit::Migration;
use crate::error::{MigrationError, MigrationResult};
use crate::events::MigrationEvent;

impl MigrationRunner {
    /// Roll back the most recently applied migration
    ///
    /// An empty ledger is a no-op: no transaction is opened and no event is
    /// emitted. A ledger entry with no registered unit is reported as
    /// [`RollbackOutcome::TargetMissing`] and left in place.
    pub async fn rollback(&mut self) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();

        let Some(latest) = self.ledger.most_recently_applied(&mut self.conn).await? else {
            tracing::debug!("Nothing to roll back");
            return Ok(RollbackResult {
                outcome: RollbackOutcome::NothingToRollback,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        };

        let (outcome, event) = match self.registry.find(&latest) {
            Some(entry) => {
                tracing::debug!("Rolling back migration: {}", latest);
                match revert_migration(&mut self.conn, &self.ledger, &latest, entry.migration()).await {
                    Ok(()) => (
                        RollbackOutcome::RolledBack {
                            migration: latest.clone(),
                        },
                        MigrationEvent::RolledBack { migration: latest },
                    ),
                    Err(err) => {
                        let error = err.to_string();
                        (
                            RollbackOutcome::Failed {
                                migration: latest.clone(),
                                error: error.clone(),
                            },
                            MigrationEvent::RollbackFailed {
                                migration: latest,
                                error,
                            },
                        )
                    }
                }
            }
            None => (
                RollbackOutcome::TargetMissing {
                    migration: latest.clone(),
                },
                MigrationEvent::RollbackTargetMissing { migration: latest },
            ),
        };
        self.sink.emit(&event).await;

        Ok(RollbackResult {
            outcome,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

/// Run `down` and remove the ledger entry in one transaction
async fn revert_migration(
    conn: &mut AnyConnection,
    ledger: &Ledger,
    name: &str,
    migration: &dyn Migration,
) -> MigrationResult<()> {
    let mut transaction = conn.begin().await.map_err(|e| {
        MigrationError::Transaction(format!("Failed to start rollback transaction: {}", e))
    })?;

    let outcome = match migration.down(&mut *transaction).await {
        Ok(()) => ledger.unrecord(&mut *transaction, name).await.map(|removed| {
            tracing::debug!("Removed {} ledger entries for {}", removed, name);
        }),
        Err(err) => Err(unit_error(err, |message| MigrationError::Revert {
            migration: name.to_string(),
            message,
        })),
    };

    finish_transaction(transaction, name, outcome).await
}
