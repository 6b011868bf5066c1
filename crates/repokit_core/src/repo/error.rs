//! Error taxonomy for repository and query operations.
//!
//! # Invariants
//! - Caller contract violations surface as `InvalidArgument`, never as a
//!   silent no-op.
//! - Not-found is not an error: lookups return `Option`.
//! - Store failures are wrapped in `Db` and propagated unchanged.

use crate::db::DbError;
use crate::model::schema::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Required argument missing or malformed (filter, mutator, ordering text,
    /// unknown field or relation).
    InvalidArgument(String),
    /// No schema registered on the session for this entity type.
    UnregisteredEntity(&'static str),
    /// Schema descriptor is invalid.
    Schema(SchemaError),
    /// Registered schema names a table the database does not have.
    MissingRequiredTable(String),
    /// Registered schema names a column the table does not have.
    MissingRequiredColumn { table: String, column: String },
    Db(DbError),
    /// Persisted data cannot be materialized into the entity type.
    InvalidData(String),
}

impl RepoError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::UnregisteredEntity(type_name) => {
                write!(f, "no schema registered for entity type `{type_name}`")
            }
            Self::Schema(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => write!(f, "required table missing: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column missing: {table}.{column}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<SchemaError> for RepoError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
