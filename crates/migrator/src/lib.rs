//! # migrator: reversible schema migrations
//!
//! Registers migration units in a fixed order, applies the pending ones
//! inside per-unit transactions, and rolls back the most recent one. A
//! ledger table in the target database records what has been applied.
//!
//! ```rust,no_run
//! use migrator::{MigrationConfig, MigrationRegistry, MigrationRunner};
//!
//! # async fn example() -> migrator::MigrationResult<()> {
//! let mut registry = MigrationRegistry::new();
//! registry.register_sql(
//!     "create_users",
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
//!     "DROP TABLE users",
//! )?;
//!
//! let config = MigrationConfig::new("sqlite://app.db");
//! let mut runner = MigrationRunner::connect(&config, registry).await?;
//! let result = runner.migrate().await?;
//! println!("applied {} migrations", result.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod migrations;

pub use config::*;
pub use error::*;
pub use events::*;
pub use migrations::*;
