//! Error types for the migration system
//!
//! Per-unit failures (`Apply`, `Revert`, `LedgerWrite`, `Transaction`) are
//! caught by the runner and reported as events. Everything else is returned
//! to the caller.

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The ledger table could not be created; nothing else may run
    #[error("Failed to initialize migrations table '{table}': {message}")]
    SchemaInit { table: String, message: String },

    /// A unit's forward change failed
    #[error("{message}")]
    Apply { migration: String, message: String },

    /// A unit's backward change failed
    #[error("{message}")]
    Revert { migration: String, message: String },

    /// Recording or removing a ledger entry failed after the unit itself succeeded
    #[error("Failed to update ledger for {migration}: {message}")]
    LedgerWrite { migration: String, message: String },

    /// Reading the ledger failed
    #[error("Failed to query migrations table: {0}")]
    Ledger(String),

    /// Begin/commit/rollback failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Two units were registered under the same name
    #[error("Migration '{0}' is already registered")]
    DuplicateMigration(String),

    /// Invalid configuration (bad table name, unknown database scheme, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Could not open the database connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A migration file could not be parsed
    #[error("Invalid migration file {path}: {reason}")]
    InvalidMigrationFile { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other database error raised inside a unit
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MigrationError {
    /// Wrap a failure raised while applying `migration`
    pub fn apply(migration: &str, err: impl std::fmt::Display) -> Self {
        MigrationError::Apply {
            migration: migration.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap a failure raised while reverting `migration`
    pub fn revert(migration: &str, err: impl std::fmt::Display) -> Self {
        MigrationError::Revert {
            migration: migration.to_string(),
            message: err.to_string(),
        }
    }
}

/// The driver's own message for a database error, without the
/// "error returned from database" wrapper
pub(crate) fn database_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_errors_display_underlying_message() {
        let err = MigrationError::apply("create_users", "table users already exists");
        assert_eq!(err.to_string(), "table users already exists");

        let err = MigrationError::LedgerWrite {
            migration: "create_users".to_string(),
            message: "no such table: migrations".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to update ledger for create_users: no such table: migrations"
        );
    }

    #[test]
    fn test_setup_errors_name_the_cause() {
        let err = MigrationError::SchemaInit {
            table: "migrations".to_string(),
            message: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to initialize migrations table 'migrations': permission denied"
        );
        assert_eq!(
            MigrationError::DuplicateMigration("a".to_string()).to_string(),
            "Migration 'a' is already registered"
        );
    }

    #[test]
    fn test_database_message_passes_other_errors_through() {
        assert_eq!(
            database_message(&sqlx::Error::RowNotFound),
            sqlx::Error::RowNotFound.to_string()
        );
    }
}
