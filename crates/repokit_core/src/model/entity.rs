//! Base entity contract shared by every persisted record.
//!
//! # Responsibility
//! - Define the minimal shape (identity, audit timestamps, soft-delete flag)
//!   the generic repository relies on.
//! - Provide timestamp and tombstone helpers used by write paths.
//!
//! # Invariants
//! - `created_at` is set once at construction.
//! - `updated_at >= created_at`, and `touch()` never moves it backwards.
//! - `is_deleted == 0` means live; any other value is a soft-delete tombstone.
//! - Reads never filter on `is_deleted` implicitly.

use rusqlite::types::{FromSql, Value};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const IS_DELETED_COLUMN: &str = "is_deleted";

/// Primary key types usable by the generic repository.
pub trait EntityKey: Clone + PartialEq + Debug + FromSql + 'static {
    /// Converts the key into its stored column value.
    fn to_value(&self) -> Value;
}

impl EntityKey for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }
}

impl EntityKey for i32 {
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl EntityKey for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

/// Columns every entity table carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseFields<K> {
    pub id: K,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Refreshed by every mutating write.
    pub updated_at: i64,
    /// Soft delete tombstone (0 = live).
    pub is_deleted: i32,
}

impl<K: EntityKey> BaseFields<K> {
    /// Creates live base fields with both timestamps set to now.
    pub fn new(id: K) -> Self {
        let now = now_epoch_ms();
        Self {
            id,
            created_at: now,
            updated_at: now,
            is_deleted: 0,
        }
    }

    /// Reads the base columns from a row selected by the entity schema.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(ID_COLUMN)?,
            created_at: row.get(CREATED_AT_COLUMN)?,
            updated_at: row.get(UPDATED_AT_COLUMN)?,
            is_deleted: row.get(IS_DELETED_COLUMN)?,
        })
    }

    /// Refreshes `updated_at` to now without ever moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = now_epoch_ms()
            .max(self.updated_at)
            .max(self.created_at);
    }

    /// Sets the soft-delete tombstone.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = 1;
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted != 0
    }
}

/// A persisted record managed by the generic repository.
///
/// Implementors only describe how to reach their base fields and how to
/// materialize themselves from a row; column access for writes, filters and
/// ordering goes through the registered [`EntitySchema`](crate::EntitySchema).
pub trait Entity: Clone + 'static {
    type Key: EntityKey;

    fn base(&self) -> &BaseFields<Self::Key>;

    fn base_mut(&mut self) -> &mut BaseFields<Self::Key>;

    /// Builds an entity from a row containing every schema column.
    ///
    /// Relation fields start empty; inclusion loaders fill them.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn id(&self) -> &Self::Key {
        &self.base().id
    }
}

/// Generates a fresh key for string-keyed entities.
pub fn new_string_key() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall clock in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
