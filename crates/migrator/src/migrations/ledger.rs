//! Migration Ledger - the persisted record of applied migrations
//!
//! The ledger table is the only state the migrator owns. A row exists for a
//! migration exactly while its forward change is applied; `record` and
//! `unrecord` run on the unit's own transaction so the two never diverge.

use chrono::NaiveDateTime;
use sqlx::{AnyConnection, Row};

use super::definitions::LedgerEntry;
use crate::config::{validate_table_name, Dialect, MigrationConfig};
use crate::error::{database_message, MigrationError, MigrationResult};

/// Accessor for the ledger table
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
    dialect: Dialect,
}

impl Ledger {
    /// Create a ledger over `table`, rejecting names that are not plain identifiers
    pub fn new(table: impl Into<String>, dialect: Dialect) -> MigrationResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { table, dialect })
    }

    pub fn from_config(config: &MigrationConfig) -> MigrationResult<Self> {
        Self::new(config.migrations_table.clone(), config.dialect()?)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Create the ledger table if it does not exist yet
    pub async fn ensure_schema(&self, conn: &mut AnyConnection) -> MigrationResult<()> {
        let sql = self.create_table_sql();
        sqlx::query(&sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::SchemaInit {
                table: self.table.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!("Ensured migrations table '{}' exists", self.table);
        Ok(())
    }

    /// Names of all applied migrations, oldest first
    pub async fn list_applied(&self, conn: &mut AnyConnection) -> MigrationResult<Vec<String>> {
        let sql = format!("SELECT migration FROM {} ORDER BY id ASC", self.table);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MigrationError::Ledger(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| MigrationError::Ledger(format!("Failed to get migration name: {}", e)))
            })
            .collect()
    }

    /// Name of the most recently applied migration (highest id)
    pub async fn most_recently_applied(&self, conn: &mut AnyConnection) -> MigrationResult<Option<String>> {
        let sql = format!("SELECT migration FROM {} ORDER BY id DESC LIMIT 1", self.table);
        let row = sqlx::query(&sql)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| MigrationError::Ledger(e.to_string()))?;

        row.map(|row| {
            row.try_get::<String, _>(0)
                .map_err(|e| MigrationError::Ledger(format!("Failed to get migration name: {}", e)))
        })
        .transpose()
    }

    /// Every ledger row, oldest first
    pub async fn entries(&self, conn: &mut AnyConnection) -> MigrationResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT id, migration, {} AS applied_at FROM {} ORDER BY id ASC",
            self.dialect.timestamp_as_text("created_at"),
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MigrationError::Ledger(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| MigrationError::Ledger(format!("Failed to get id: {}", e)))?;
            let migration: String = row
                .try_get("migration")
                .map_err(|e| MigrationError::Ledger(format!("Failed to get migration name: {}", e)))?;
            let applied_at: String = row
                .try_get("applied_at")
                .map_err(|e| MigrationError::Ledger(format!("Failed to get applied_at: {}", e)))?;

            entries.push(LedgerEntry {
                id,
                migration,
                applied_at: parse_timestamp(&applied_at)?,
            });
        }

        Ok(entries)
    }

    /// Insert a ledger entry for `migration`
    ///
    /// Must run on the transaction that applied the migration.
    pub async fn record(&self, conn: &mut AnyConnection, migration: &str) -> MigrationResult<()> {
        let sql = self.record_sql();
        sqlx::query(&sql)
            .bind(migration)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::LedgerWrite {
                migration: migration.to_string(),
                message: database_message(&e),
            })?;
        Ok(())
    }

    /// Delete the ledger entry for `migration`, matching by name
    pub async fn unrecord(&self, conn: &mut AnyConnection, migration: &str) -> MigrationResult<u64> {
        let sql = self.remove_sql();
        let result = sqlx::query(&sql)
            .bind(migration)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrationError::LedgerWrite {
                migration: migration.to_string(),
                message: database_message(&e),
            })?;
        Ok(result.rows_affected())
    }

    /// SQL to create the migrations tracking table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {},\n    \
                migration VARCHAR(255) NOT NULL,\n    \
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table,
            self.dialect.auto_increment_id()
        )
    }

    /// SQL to record a migration as applied
    fn record_sql(&self) -> String {
        format!(
            "INSERT INTO {} (migration) VALUES ({})",
            self.table,
            self.dialect.placeholder(1)
        )
    }

    /// SQL to remove a migration record (for rollback)
    fn remove_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE migration = {}",
            self.table,
            self.dialect.placeholder(1)
        )
    }
}

/// Timestamps come back as text so every backend decodes the same way
fn parse_timestamp(value: &str) -> MigrationResult<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| MigrationError::Ledger(format!("Invalid applied_at '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_ledger_sql_generation() {
        let ledger = Ledger::new("migrations", Dialect::Postgres).unwrap();
        let create_sql = ledger.create_table_sql();
        assert!(create_sql.contains("CREATE TABLE IF NOT EXISTS migrations"));
        assert!(create_sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(create_sql.contains("migration VARCHAR(255) NOT NULL"));
        assert!(create_sql.contains("created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP"));
        assert_eq!(ledger.record_sql(), "INSERT INTO migrations (migration) VALUES ($1)");
        assert_eq!(ledger.remove_sql(), "DELETE FROM migrations WHERE migration = $1");

        let ledger = Ledger::new("schema_history", Dialect::Sqlite).unwrap();
        assert!(ledger
            .create_table_sql()
            .contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert_eq!(ledger.record_sql(), "INSERT INTO schema_history (migration) VALUES (?)");

        let ledger = Ledger::new("migrations", Dialect::MySql).unwrap();
        assert!(ledger
            .create_table_sql()
            .contains("id BIGINT AUTO_INCREMENT PRIMARY KEY"));
    }

    #[test]
    fn test_rejects_unsafe_table_names() {
        assert!(Ledger::new("migrations; DROP TABLE users", Dialect::Sqlite).is_err());
        assert!(Ledger::new("", Dialect::Postgres).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let sqlite = parse_timestamp("2024-03-01 12:30:45").unwrap();
        assert_eq!(sqlite.to_string(), "2024-03-01 12:30:45");

        let postgres = parse_timestamp("2024-03-01 12:30:45.123456").unwrap();
        assert_eq!(postgres.nanosecond(), 123_456_000);

        assert!(parse_timestamp("2024-03-01T12:30:45").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
