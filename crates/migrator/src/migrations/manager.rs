//! Migration Manager - File system operations for migrations
//!
//! Handles creating, loading, and parsing SQL migration files. A file holds
//! both directions:
//!
//! ```sql
//! -- Up migration
//! CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```
//!
//! The file stem (`20240101_120000_create_users`) is the migration name, and
//! files run in file-name order.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sqlparser::dialect::{Dialect as SqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Token, Tokenizer};

use super::registry::MigrationRegistry;
use super::unit::SqlMigration;
use crate::config::{Dialect, MigrationConfig};
use crate::error::{MigrationError, MigrationResult};

/// A migration read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File stem, used as the migration name
    pub name: String,
    pub path: PathBuf,
    pub migration: SqlMigration,
}

/// Migration manager for creating and loading migration files
#[derive(Debug, Clone)]
pub struct MigrationManager {
    migrations_dir: PathBuf,
}

impl MigrationManager {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.migrations_dir.clone())
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create a new migration file from the template and return its path
    pub fn create_migration(&self, name: &str) -> MigrationResult<PathBuf> {
        let slug = name.trim().replace([' ', '-'], "_").to_lowercase();
        if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MigrationError::Configuration(format!(
                "Invalid migration name '{}': use letters, digits, spaces or underscores",
                name
            )));
        }

        fs::create_dir_all(&self.migrations_dir)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let migration_name = format!("{}_{}", timestamp, slug);
        let filepath = self.migrations_dir.join(format!("{}.sql", migration_name));
        if filepath.exists() {
            return Err(MigrationError::Configuration(format!(
                "Migration file {} already exists",
                filepath.display()
            )));
        }

        fs::write(&filepath, migration_template(name, &migration_name))?;
        tracing::info!("Created migration file {}", filepath.display());

        Ok(filepath)
    }

    /// Load all `.sql` files from the migrations directory, ordered by file name
    pub fn load_migrations(&self) -> MigrationResult<Vec<MigrationFile>> {
        if !self.migrations_dir.exists() {
            tracing::debug!(
                "Migrations directory {} does not exist",
                self.migrations_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.migrations_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(|path| parse_migration_file(path)).collect()
    }

    /// Load the migrations directory into a registry, in file-name order
    pub fn load_registry(&self) -> MigrationResult<MigrationRegistry> {
        let mut registry = MigrationRegistry::new();
        for file in self.load_migrations()? {
            registry.register(file.name, file.migration)?;
        }
        Ok(registry)
    }
}

fn parse_migration_file(path: &Path) -> MigrationResult<MigrationFile> {
    let invalid = |reason: &str| MigrationError::InvalidMigrationFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let stem = path.file_stem().ok_or_else(|| invalid("path has no file name"))?;
    let name = stem
        .to_str()
        .ok_or_else(|| invalid("file name is not valid UTF-8"))?
        .to_string();
    if name.is_empty() {
        return Err(invalid("file name is empty"));
    }

    let content = fs::read_to_string(path)?;
    let (up_sql, down_sql) = parse_migration_content(&content)
        .ok_or_else(|| invalid("missing '-- Up migration' section"))?;

    Ok(MigrationFile {
        name,
        path: path.to_path_buf(),
        migration: SqlMigration::new(up_sql, down_sql),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Split file content into its up and down SQL; `None` without an up marker
fn parse_migration_content(content: &str) -> Option<(String, String)> {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut section = Section::Preamble;
    let mut saw_up = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(comment) = trimmed.strip_prefix("--") {
            match comment.trim().to_lowercase().as_str() {
                "up" | "up migration" => {
                    section = Section::Up;
                    saw_up = true;
                }
                "down" | "down migration" => section = Section::Down,
                _ => {}
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        match section {
            Section::Up => up_sql.push(line),
            Section::Down => down_sql.push(line),
            Section::Preamble => {}
        }
    }

    saw_up.then(|| (up_sql.join("\n"), down_sql.join("\n")))
}

fn migration_template(name: &str, migration_name: &str) -> String {
    format!(
        "-- Migration: {}\n\
         -- Name: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\n\n\
         -- Down migration\n\n",
        name,
        migration_name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Split SQL text into individual statements
///
/// Tokenizes with the rules of `dialect` so that semicolons inside string
/// literals and comments do not split, and keeps trigger bodies
/// (`BEGIN ... END`) and `CASE ... END` together. Falls back to naive
/// semicolon splitting if tokenizing fails.
pub fn split_sql_statements(sql: &str, dialect: Dialect) -> Vec<String> {
    let sql_dialect = tokenizer_dialect(dialect);
    let tokens = match Tokenizer::new(sql_dialect.as_ref(), sql)
        .with_unescape(false)
        .tokenize()
    {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("SQL tokenizing failed, using naive semicolon splitting: {}", e);
            return sql
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    };

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut in_trigger = false;
    let mut depth = 0usize;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::SemiColon if depth == 0 => {
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
                in_trigger = false;
            }
            Token::EOF => {}
            Token::Whitespace(ws) => current.push_str(&ws.to_string()),
            other => {
                if let Some(keyword) = bare_keyword(other) {
                    match keyword.as_str() {
                        "TRIGGER" => in_trigger = true,
                        "BEGIN" if in_trigger => depth += 1,
                        "CASE" => depth += 1,
                        "END" if depth > 0 && !ends_control_flow(&tokens[index + 1..]) => depth -= 1,
                        _ => {}
                    }
                }
                has_code = true;
                current.push_str(&other.to_string());
            }
        }
    }
    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

fn tokenizer_dialect(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
    }
}

/// Uppercased value of an unquoted word token
fn bare_keyword(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_ascii_uppercase()),
        _ => None,
    }
}

/// `END IF`, `END LOOP` and friends close blocks that were never counted
fn ends_control_flow(rest: &[Token]) -> bool {
    rest.iter()
        .find(|token| !matches!(token, Token::Whitespace(_)))
        .and_then(bare_keyword)
        .is_some_and(|keyword| matches!(keyword.as_str(), "IF" | "LOOP" | "WHILE" | "REPEAT"))
}
