//! Migration Registry - the ordered set of units a session may run
//!
//! Registration order is execution order. Names must be unique: the ledger
//! matches entries to units by name alone.

use std::fmt;

use super::unit::{Migration, SqlMigration};
use crate::error::{MigrationError, MigrationResult};

/// A unit together with the name it was registered under
pub struct RegisteredMigration {
    name: String,
    migration: Box<dyn Migration>,
}

impl RegisteredMigration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn migration(&self) -> &dyn Migration {
        self.migration.as_ref()
    }
}

impl fmt::Debug for RegisteredMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMigration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of migration units
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: Vec<RegisteredMigration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit under `name`
    ///
    /// Fails with [`MigrationError::DuplicateMigration`] when the name is
    /// already taken.
    pub fn register<M>(&mut self, name: impl Into<String>, migration: M) -> MigrationResult<&mut Self>
    where
        M: Migration + 'static,
    {
        self.register_boxed(name, Box::new(migration))
    }

    /// Register a unit produced by `factory`
    pub fn register_with<M, F>(&mut self, name: impl Into<String>, factory: F) -> MigrationResult<&mut Self>
    where
        M: Migration + 'static,
        F: FnOnce() -> M,
    {
        self.register(name, factory())
    }

    /// Register a unit written as up/down SQL
    pub fn register_sql(
        &mut self,
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> MigrationResult<&mut Self> {
        self.register(name, SqlMigration::new(up_sql, down_sql))
    }

    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        migration: Box<dyn Migration>,
    ) -> MigrationResult<&mut Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MigrationError::Configuration(
                "Migration name cannot be empty".to_string(),
            ));
        }
        if self.contains(&name) {
            return Err(MigrationError::DuplicateMigration(name));
        }

        tracing::debug!("Registered migration: {}", name);
        self.migrations.push(RegisteredMigration { name, migration });
        Ok(self)
    }

    /// First unit registered under `name`
    pub fn find(&self, name: &str) -> Option<&RegisteredMigration> {
        self.migrations.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredMigration> {
        self.migrations.iter()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_preserved() {
        let mut registry = MigrationRegistry::new();
        registry
            .register_sql("create_users", "CREATE TABLE users (id INTEGER)", "DROP TABLE users")
            .unwrap()
            .register_sql("create_posts", "CREATE TABLE posts (id INTEGER)", "DROP TABLE posts")
            .unwrap()
            .register_with("create_tags", || {
                SqlMigration::new("CREATE TABLE tags (id INTEGER)", "DROP TABLE tags")
            })
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["create_users", "create_posts", "create_tags"]);
        assert!(registry.contains("create_posts"));
        assert_eq!(registry.find("create_tags").unwrap().name(), "create_tags");
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = MigrationRegistry::new();
        registry.register_sql("create_users", "SELECT 1", "SELECT 1").unwrap();

        let err = registry
            .register_sql("create_users", "SELECT 2", "SELECT 2")
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigration(ref name) if name == "create_users"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut registry = MigrationRegistry::new();
        assert!(registry.register_sql("  ", "SELECT 1", "SELECT 1").is_err());
        assert!(registry.is_empty());
    }
}
