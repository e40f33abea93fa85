//! Migration configuration
//!
//! Holds where migrations come from, where the ledger lives, and which SQL
//! dialect the ledger queries must speak.

use std::path::PathBuf;

use crate::error::{MigrationError, MigrationResult};

/// Default name of the ledger table
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

/// Characters allowed in the ledger table name
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// SQL dialects the ledger knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
    MySql,
}

impl Dialect {
    /// Detect the dialect from a database URL scheme
    pub fn from_url(database_url: &str) -> MigrationResult<Self> {
        let scheme = database_url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| {
                MigrationError::Configuration(format!(
                    "Database URL '{}' has no scheme",
                    database_url
                ))
            })?;

        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(MigrationError::Configuration(format!(
                "Unsupported database scheme '{}'",
                other
            ))),
        }
    }

    /// Dialect of an open connection, from `AnyConnection::backend_name`
    pub fn from_backend_name(backend: &str) -> MigrationResult<Self> {
        match backend.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" => Ok(Dialect::MySql),
            other => Err(MigrationError::Configuration(format!(
                "Unsupported database backend '{}'",
                other
            ))),
        }
    }

    /// Bind placeholder for the `index`-th (1-based) parameter
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Column definition for the auto-incrementing ledger id
    pub fn auto_increment_id(&self) -> &'static str {
        match self {
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::MySql => "id BIGINT AUTO_INCREMENT PRIMARY KEY",
        }
    }

    /// Expression rendering a timestamp column as text
    pub fn timestamp_as_text(&self, column: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("CAST({} AS TEXT)", column),
            Dialect::MySql => format!("CAST({} AS CHAR)", column),
        }
    }
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Connection string, e.g. `postgres://localhost/app` or `sqlite::memory:`
    pub database_url: String,
    /// Directory where SQL migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking applied migrations
    pub migrations_table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Create a configuration for the given database with default paths
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    /// Read `DATABASE_URL`, `MIGRATIONS_DIR` and `MIGRATIONS_TABLE`, falling
    /// back to defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            migrations_dir: std::env::var("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.migrations_dir),
            migrations_table: std::env::var("MIGRATIONS_TABLE")
                .unwrap_or(defaults.migrations_table),
        }
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    /// Dialect implied by the database URL
    pub fn dialect(&self) -> MigrationResult<Dialect> {
        Dialect::from_url(&self.database_url)
    }

    /// Check that the configuration can be used to build a session
    pub fn validate(&self) -> MigrationResult<()> {
        self.dialect()?;
        validate_table_name(&self.migrations_table)
    }
}

/// The ledger table name is interpolated into SQL, so only plain identifiers pass
pub fn validate_table_name(table: &str) -> MigrationResult<()> {
    if table.is_empty() {
        return Err(MigrationError::Configuration(
            "Migrations table name cannot be empty".to_string(),
        ));
    }

    if table.len() > 63 {
        return Err(MigrationError::Configuration(format!(
            "Migrations table name '{}' is too long (max 63 characters)",
            table
        )));
    }

    if let Some(c) = table.chars().find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c)) {
        return Err(MigrationError::Configuration(format!(
            "Migrations table name '{}' contains invalid character '{}'",
            table, c
        )));
    }

    if table.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(MigrationError::Configuration(format!(
            "Migrations table name '{}' cannot start with a number",
            table
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://user:pw@localhost/app").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/app").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("mysql://root@localhost/app").unwrap(), Dialect::MySql);
        assert!(Dialect::from_url("mssql://localhost").is_err());
        assert!(Dialect::from_url("not a url").is_err());
    }

    #[test]
    fn test_dialect_from_backend_name() {
        assert_eq!(Dialect::from_backend_name("PostgreSQL").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_backend_name("SQLite").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_backend_name("MySQL").unwrap(), Dialect::MySql);
        assert!(Dialect::from_backend_name("MSSQL").is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
        assert_eq!(Dialect::MySql.placeholder(2), "?");
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("migrations").is_ok());
        assert!(validate_table_name("app_schema_migrations").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1migrations").is_err());
        assert!(validate_table_name("migrations; DROP TABLE users").is_err());
        assert!(validate_table_name(&"m".repeat(64)).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert_eq!(config.migrations_table, "migrations");
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert!(config.validate().is_ok());

        let config = MigrationConfig::new("postgres://localhost/app")
            .with_migrations_table("schema_history")
            .with_migrations_dir("db/migrations");
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
        assert_eq!(config.migrations_table, "schema_history");
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
    }
}
