//! SQLite storage bootstrap, migrations and the store session.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply caller-supplied schema migrations in deterministic order.
//! - Own the session that stages commands and materializes deferred queries.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Sessions are handed out only after migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod query;
pub mod session;

pub use open::{open_session, open_session_in_memory, open_session_with_config};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Migration list is not strictly increasing by version.
    InvalidMigrationOrder { previous: u32, next: u32 },
    /// A staged update or removal matched no row at commit time.
    RowNotAffected { table: &'static str, key: String },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InvalidMigrationOrder { previous, next } => write!(
                f,
                "migration version {next} must be greater than preceding version {previous}"
            ),
            Self::RowNotAffected { table, key } => {
                write!(f, "no row in `{table}` matched key {key}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
