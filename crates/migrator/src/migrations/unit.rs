//! Migration units
//!
//! A unit is one reversible schema change. The runner hands it the session
//! connection with a transaction already open, so everything a unit executes
//! commits or rolls back together with its ledger entry.

use async_trait::async_trait;
use sqlx::AnyConnection;

use super::manager::split_sql_statements;
use crate::config::Dialect;
use crate::error::MigrationResult;

/// A reversible schema change
///
/// Units are identified by the name they are registered under, not by their
/// type, so the same implementation can back several registrations.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the forward change
    async fn up(&self, conn: &mut AnyConnection) -> MigrationResult<()>;

    /// Undo what `up` did
    async fn down(&self, conn: &mut AnyConnection) -> MigrationResult<()>;
}

/// A migration written as plain SQL
///
/// Both directions may hold several statements; they are split and executed
/// one at a time inside the unit's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }
}

async fn execute_script(conn: &mut AnyConnection, sql: &str) -> MigrationResult<()> {
    let dialect = Dialect::from_backend_name(conn.backend_name())?;
    for statement in split_sql_statements(sql, dialect) {
        tracing::debug!("Executing migration statement: {}", statement);
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Migration for SqlMigration {
    async fn up(&self, conn: &mut AnyConnection) -> MigrationResult<()> {
        execute_script(conn, &self.up_sql).await
    }

    async fn down(&self, conn: &mut AnyConnection) -> MigrationResult<()> {
        execute_script(conn, &self.down_sql).await
    }
}
