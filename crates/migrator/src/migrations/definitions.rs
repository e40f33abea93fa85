//! Migration Definitions - Core types shared by the ledger and the runner
//!
//! Ledger rows, run reports and status listings.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Auto-assigned id; higher means more recent
    pub id: i64,
    /// Name of the migration unit
    pub migration: String,
    /// When the entry was inserted (database clock)
    pub applied_at: NaiveDateTime,
}

/// A unit that failed during a forward run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMigration {
    pub migration: String,
    pub error: String,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationRunResult {
    /// Names of the migrations applied by this run, in order
    pub applied: Vec<String>,
    /// Migrations that failed and were rolled back
    pub failed: Vec<FailedMigration>,
    /// Number of migrations skipped because the ledger already had them
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// What a single rollback call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The ledger was empty
    NothingToRollback,
    /// The most recent migration was reverted and its ledger entry removed
    RolledBack { migration: String },
    /// Reverting failed; the transaction was rolled back and the entry kept
    Failed { migration: String, error: String },
    /// The most recent ledger entry names a migration that is not registered
    TargetMissing { migration: String },
}

/// Result of rolling back the most recent migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub outcome: RollbackOutcome,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    /// Name of the migration that was targeted, if any
    pub fn migration(&self) -> Option<&str> {
        match &self.outcome {
            RollbackOutcome::NothingToRollback => None,
            RollbackOutcome::RolledBack { migration }
            | RollbackOutcome::Failed { migration, .. }
            | RollbackOutcome::TargetMissing { migration } => Some(migration),
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: NaiveDateTime,
    },
}

/// Status of one registered migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    pub status: MigrationStatus,
}

/// Registered migrations with their state, plus ledger rows nothing claims
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    /// Every registered migration, in registration order
    pub migrations: Vec<MigrationStatusEntry>,
    /// Ledger entries whose migration is not registered
    pub orphaned: Vec<LedgerEntry>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &MigrationStatusEntry> {
        self.migrations
            .iter()
            .filter(|m| m.status == MigrationStatus::Pending)
    }
}
