//! Store session: schema registry, staged commands and change tracking.
//!
//! # Responsibility
//! - Resolve entity schemas (and table names) by entity type.
//! - Hand out deferred queries over registered entity types.
//! - Stage insert/update/remove commands and flush them in one transaction.
//! - Keep snapshots of tracked reads so updates can write dirty columns only.
//!
//! # Invariants
//! - A session is single-threaded (`!Sync`); callers serialize access.
//! - `save()` drains the staging area whether the commit succeeds or not.
//! - Staged commands are invisible to queries until `save()` commits them.

use crate::db::query::Query;
use crate::db::DbError;
use crate::model::entity::{Entity, EntityKey};
use crate::model::schema::{quote_ident, EntitySchema, SchemaError};
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Insert,
    Update,
    Delete,
}

impl CommandKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One staged write.
#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub(crate) kind: CommandKind,
    pub(crate) table: &'static str,
    pub(crate) key: Value,
    pub(crate) sql: String,
    pub(crate) params: Vec<Value>,
    /// Column values after the write; replaces the tracked snapshot on commit.
    pub(crate) snapshot: Option<Vec<Value>>,
}

type TrackingKey = (&'static str, String);

/// Unit of work over one SQLite connection.
pub struct Session {
    conn: Connection,
    schemas: HashMap<TypeId, Box<dyn Any>>,
    pending: RefCell<Vec<Command>>,
    tracked: RefCell<HashMap<TrackingKey, Vec<Value>>>,
}

impl Session {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            schemas: HashMap::new(),
            pending: RefCell::new(Vec::new()),
            tracked: RefCell::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Registers the schema for `E`, checking the table and its columns exist.
    pub fn register<E: Entity>(&mut self, schema: EntitySchema<E>) -> RepoResult<()> {
        let type_id = TypeId::of::<E>();
        if self.schemas.contains_key(&type_id) {
            return Err(SchemaError::AlreadyRegistered(type_name::<E>()).into());
        }

        let table = schema.table_name();
        if !table_exists(&self.conn, table)? {
            return Err(RepoError::MissingRequiredTable(table.to_string()));
        }
        let existing = table_columns(&self.conn, table)?;
        for column in schema.columns() {
            if !existing
                .iter()
                .any(|current| current.eq_ignore_ascii_case(column))
            {
                return Err(RepoError::MissingRequiredColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }

        self.schemas.insert(type_id, Box::new(schema));
        info!(
            "event=schema_register module=db status=ok table={} entity={}",
            table,
            type_name::<E>()
        );
        Ok(())
    }

    pub fn schema<E: Entity>(&self) -> RepoResult<&EntitySchema<E>> {
        self.schemas
            .get(&TypeId::of::<E>())
            .and_then(|schema| schema.downcast_ref::<EntitySchema<E>>())
            .ok_or(RepoError::UnregisteredEntity(type_name::<E>()))
    }

    /// Table name registered for `E`.
    pub fn table_name<E: Entity>(&self) -> Option<&'static str> {
        self.schema::<E>().ok().map(EntitySchema::table_name)
    }

    /// Starts a deferred query over every row of `E`'s table.
    pub fn query<E: Entity>(&self) -> RepoResult<Query<'_, E>> {
        Ok(Query::new(self, self.schema::<E>()?))
    }

    pub(crate) fn stage(&self, command: Command) {
        debug!(
            "event=command_stage module=db op={} table={} key={}",
            command.kind.as_str(),
            command.table,
            key_repr(&command.key)
        );
        self.pending.borrow_mut().push(command);
    }

    /// Number of staged commands waiting for `save()`.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Flushes every staged command in one transaction.
    ///
    /// Returns the number of affected rows. A staged update or removal that
    /// matches no row fails the whole batch with `DbError::RowNotAffected`.
    pub fn save(&self) -> RepoResult<usize> {
        let commands = std::mem::take(&mut *self.pending.borrow_mut());
        if commands.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        match self.commit(&commands) {
            Ok(affected) => {
                self.refresh_tracking(commands.iter());
                info!(
                    "event=session_save module=db status=ok commands={} rows={} duration_ms={}",
                    commands.len(),
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                error!(
                    "event=session_save module=db status=error commands={} duration_ms={} error={}",
                    commands.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn commit(&self, commands: &[Command]) -> RepoResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut affected = 0;
        for command in commands {
            let changed = tx.execute(&command.sql, params_from_iter(command.params.iter()))?;
            if changed == 0 && command.kind != CommandKind::Insert {
                return Err(DbError::RowNotAffected {
                    table: command.table,
                    key: key_repr(&command.key),
                }
                .into());
            }
            affected += changed;
        }
        tx.commit()?;
        Ok(affected)
    }

    fn refresh_tracking<'c>(&self, commands: impl Iterator<Item = &'c Command>) {
        let mut tracked = self.tracked.borrow_mut();
        for command in commands {
            let key = (command.table, key_repr(&command.key));
            match command.kind {
                CommandKind::Delete => {
                    tracked.remove(&key);
                }
                CommandKind::Update => {
                    if let (Some(slot), Some(snapshot)) = (tracked.get_mut(&key), &command.snapshot) {
                        slot.clone_from(snapshot);
                    }
                }
                CommandKind::Insert => {}
            }
        }
    }

    pub(crate) fn track(&self, table: &'static str, key: &Value, snapshot: Vec<Value>) {
        self.tracked
            .borrow_mut()
            .insert((table, key_repr(key)), snapshot);
    }

    pub(crate) fn tracked_snapshot(&self, table: &'static str, key: &Value) -> Option<Vec<Value>> {
        self.tracked
            .borrow()
            .get(&(table, key_repr(key)))
            .cloned()
    }

    /// Tracked snapshot overlaid with the newest staged update for the key,
    /// so several staged updates of one entity diff against each other.
    pub(crate) fn latest_snapshot(&self, table: &'static str, key: &Value) -> Option<Vec<Value>> {
        let tracked = self.tracked_snapshot(table, key)?;
        let wanted = key_repr(key);
        let staged = self
            .pending
            .borrow()
            .iter()
            .rev()
            .find(|command| {
                command.kind == CommandKind::Update
                    && command.table == table
                    && key_repr(&command.key) == wanted
            })
            .and_then(|command| command.snapshot.clone());
        Some(staged.unwrap_or(tracked))
    }

    /// Whether a tracked read of `E` with this key is held by the session.
    pub fn is_tracked<E: Entity>(&self, id: &E::Key) -> bool {
        match self.table_name::<E>() {
            Some(table) => self.tracked_snapshot(table, &id.to_value()).is_some(),
            None => false,
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    /// Forgets every tracked snapshot.
    pub fn clear_tracking(&self) {
        self.tracked.borrow_mut().clear();
    }

    /// Runs a raw query and maps every row.
    pub fn sql_query<T, F>(&self, sql: &str, params: &[Value], mut map: F) -> RepoResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut mapped = Vec::new();
        while let Some(row) = rows.next()? {
            mapped.push(map(row)?);
        }
        Ok(mapped)
    }

    /// Runs a raw statement immediately, bypassing the staging area.
    pub fn execute_sql(&self, sql: &str, params: &[Value]) -> RepoResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }
}

pub(crate) fn key_repr(key: &Value) -> String {
    match key {
        Value::Integer(value) => value.to_string(),
        Value::Text(value) => value.clone(),
        other => format!("{other:?}"),
    }
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}
