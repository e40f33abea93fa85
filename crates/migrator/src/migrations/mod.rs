//! Migration System
//!
//! Units are registered in order into a [`MigrationRegistry`], the
//! [`Ledger`] records which of them are applied, and the
//! [`MigrationRunner`] moves between the two.

pub mod definitions;
pub mod ledger;
pub mod manager;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod unit;

pub use definitions::*;
pub use ledger::Ledger;
pub use manager::{split_sql_statements, MigrationFile, MigrationManager};
pub use registry::{MigrationRegistry, RegisteredMigration};
pub use runner::MigrationRunner;
pub use unit::{Migration, SqlMigration};
