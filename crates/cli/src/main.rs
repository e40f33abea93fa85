mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::migrate;
use migrator::MigrationConfig;

#[derive(Parser)]
#[command(name = "migrator")]
#[command(about = "Apply, roll back and inspect reversible schema migrations")]
#[command(version)]
struct Cli {
    /// Database connection URL (defaults to $DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Directory holding the migration files (defaults to $MIGRATIONS_DIR or ./migrations)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Name of the ledger table (defaults to $MIGRATIONS_TABLE or "migrations")
    #[arg(long, global = true)]
    table: Option<String>,

    /// Emit log records as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new migration file
    Create {
        /// Migration name
        name: String,
    },

    /// Run pending migrations
    Run,

    /// Rollback the most recently applied migration
    Rollback,

    /// Show migration status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Environment first, then explicit flags on top
    fn config(&self) -> MigrationConfig {
        let mut config = MigrationConfig::from_env();
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(dir) = &self.dir {
            config = config.with_migrations_dir(dir);
        }
        if let Some(table) = &self.table {
            config = config.with_migrations_table(table);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json)?;

    let config = cli.config();

    match cli.command {
        Commands::Create { name } => {
            migrate::create(&config, &name)?;
        }
        Commands::Run => {
            migrate::run(&config).await?;
        }
        Commands::Rollback => {
            migrate::rollback(&config).await?;
        }
        Commands::Status { json } => {
            migrate::status(&config, json).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "migrator",
            "status",
            "--json",
            "--database-url",
            "sqlite::memory:",
            "--table",
            "schema_history",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Status { json: true }));
        let config = cli.config();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.migrations_table, "schema_history");
    }

    #[test]
    fn test_create_requires_name() {
        assert!(Cli::try_parse_from(["migrator", "create"]).is_err());

        let cli = Cli::try_parse_from(["migrator", "--dir", "db/migrations", "create", "add_users"]).unwrap();
        match cli.command {
            Commands::Create { name } => assert_eq!(name, "add_users"),
            _ => panic!("expected create"),
        }
        assert_eq!(cli.dir, Some(PathBuf::from("db/migrations")));
    }
}
