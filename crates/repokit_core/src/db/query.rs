//! Deferred queries over one entity table.
//!
//! # Responsibility
//! - Compose filter, eager loads, ordering, projection and window without
//!   touching the store.
//! - Pick a plan at materialization: one SQL statement when everything can be
//!   pushed down, otherwise load the table and evaluate in memory.
//!
//! # Invariants
//! - Nothing runs until a terminal call (`to_list`, `first`, `last`, `count`,
//!   `any`).
//! - Predicate and ordering field names are validated before either plan
//!   executes.
//! - Both plans return the same rows for the same inputs.
//! - In memory, inclusion runs before the filter, then projection, ordering
//!   and the skip/take window.
//! - Only unprojected reads are tracked.

use crate::db::session::Session;
use crate::model::entity::{Entity, EntityKey, ID_COLUMN};
use crate::model::inclusion::Inclusion;
use crate::model::ordering::{OrderBy, SortDirection};
use crate::model::predicate::{Predicate, SqlFilter};
use crate::model::schema::{quote_ident, EntitySchema};
use crate::repo::error::{RepoError, RepoResult};
use log::debug;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::sync::Arc;
use std::time::Instant;

/// Shape-preserving transformation applied to every materialized entity.
pub type Projection<E> = Arc<dyn Fn(E) -> E + Send + Sync>;

/// Deferred query description.
pub struct Query<'s, E: Entity> {
    session: &'s Session,
    schema: &'s EntitySchema<E>,
    filter: Predicate<E>,
    inclusion: Inclusion<E>,
    order_by: OrderBy,
    projection: Option<Projection<E>>,
    skip: usize,
    take: Option<usize>,
    track_changes: bool,
}

impl<'s, E: Entity> Query<'s, E> {
    pub(crate) fn new(session: &'s Session, schema: &'s EntitySchema<E>) -> Self {
        Self {
            session,
            schema,
            filter: Predicate::True,
            inclusion: Inclusion::new(),
            order_by: OrderBy::default(),
            projection: None,
            skip: 0,
            take: None,
            track_changes: false,
        }
    }

    /// ANDs `predicate` into the accumulated filter.
    pub fn filter(mut self, predicate: Predicate<E>) -> Self {
        self.filter = match self.filter {
            Predicate::True => predicate,
            current => current.and(predicate),
        };
        self
    }

    /// Appends eager-load directives; the caller keeps ownership.
    pub fn include(mut self, inclusion: &Inclusion<E>) -> Self {
        self.inclusion.merge(inclusion);
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn select(mut self, projection: Projection<E>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    /// Records snapshots of the materialized rows for dirty-column updates.
    /// Ignored when a projection is set.
    pub fn tracked(mut self, track_changes: bool) -> Self {
        self.track_changes = track_changes;
        self
    }

    pub fn to_list(self) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let pushdown = match self.lowered_filter()? {
            Some(filter) if self.projection.is_none() => Some(filter),
            _ => None,
        };
        let plan = if pushdown.is_some() { "sql" } else { "memory" };

        let rows = match pushdown {
            Some(filter) => self.run_pushdown(filter)?,
            None => self.run_in_memory()?,
        };

        // projected rows no longer mirror the stored row
        let track = self.track_changes && self.projection.is_none();
        if track {
            let table = self.schema.table_name();
            for entity in &rows {
                self.session
                    .track(table, &entity.id().to_value(), self.schema.values(entity));
            }
        }

        debug!(
            "event=query_materialize module=query status=ok table={} plan={} rows={} tracked={} duration_ms={}",
            self.schema.table_name(),
            plan,
            rows.len(),
            track,
            started_at.elapsed().as_millis()
        );
        Ok(rows)
    }

    pub fn first(mut self) -> RepoResult<Option<E>> {
        self.take = Some(self.take.map_or(1, |take| take.min(1)));
        Ok(self.to_list()?.into_iter().next())
    }

    /// Last row of the ordered sequence; an unordered query orders by `id asc`.
    pub fn last(mut self) -> RepoResult<Option<E>> {
        if self.order_by.is_empty() {
            self.order_by = OrderBy::by(ID_COLUMN, SortDirection::Asc);
        }
        let windowed = self.skip > 0 || self.take.is_some();
        if windowed || self.projection.is_some() || !self.filter.is_lowerable() {
            let mut rows = self.to_list()?;
            return Ok(rows.pop());
        }
        self.order_by = self.order_by.reversed();
        self.first()
    }

    /// Rows matching the filter, ignoring ordering, projection and window.
    pub fn count(&self) -> RepoResult<usize> {
        match self.lowered_filter()? {
            Some(filter) => {
                let sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE {}",
                    quote_ident(self.schema.table_name()),
                    filter.sql
                );
                let count: i64 = self.session.connection().query_row(
                    &sql,
                    params_from_iter(filter.params.iter()),
                    |row| row.get(0),
                )?;
                Ok(usize::try_from(count).unwrap_or(0))
            }
            None => Ok(self.load_matching()?.len()),
        }
    }

    pub fn any(&self) -> RepoResult<bool> {
        match self.lowered_filter()? {
            Some(filter) => {
                let sql = format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
                    quote_ident(self.schema.table_name()),
                    filter.sql
                );
                let exists: i64 = self.session.connection().query_row(
                    &sql,
                    params_from_iter(filter.params.iter()),
                    |row| row.get(0),
                )?;
                Ok(exists == 1)
            }
            None => Ok(!self.load_matching()?.is_empty()),
        }
    }

    fn lowered_filter(&self) -> RepoResult<Option<SqlFilter>> {
        self.filter.check_fields(self.schema)?;
        self.order_by.check_fields(self.schema)?;
        self.filter.lower(self.schema)
    }

    fn run_pushdown(&self, filter: SqlFilter) -> RepoResult<Vec<E>> {
        let mut sql = format!(
            "{} WHERE {}{}",
            self.schema.select_sql(),
            filter.sql,
            self.order_by.to_sql(self.schema)?
        );
        let mut params = filter.params;
        if self.take.is_some() || self.skip > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(
                self.take.map_or(-1, |take| i64::try_from(take).unwrap_or(i64::MAX)),
            ));
            params.push(Value::Integer(i64::try_from(self.skip).unwrap_or(i64::MAX)));
        }

        let mut rows = self.fetch(&sql, &params)?;
        self.inclusion
            .apply(self.session, self.schema, &mut rows)?;
        Ok(rows)
    }

    fn run_in_memory(&self) -> RepoResult<Vec<E>> {
        let matched = self.load_matching()?;
        let mut projected = match &self.projection {
            Some(projection) => matched.into_iter().map(|entity| projection(entity)).collect(),
            None => matched,
        };
        self.order_by.sort(self.schema, &mut projected)?;
        Ok(projected
            .into_iter()
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .collect())
    }

    fn load_matching(&self) -> RepoResult<Vec<E>> {
        let mut rows = self.fetch(self.schema.select_sql(), &[])?;
        self.inclusion
            .apply(self.session, self.schema, &mut rows)?;

        let mut matched = Vec::with_capacity(rows.len());
        for entity in rows {
            if self.filter.evaluate(self.schema, &entity)? {
                matched.push(entity);
            }
        }
        Ok(matched)
    }

    fn fetch(&self, sql: &str, params: &[Value]) -> RepoResult<Vec<E>> {
        let mut stmt = self.session.connection().prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            let entity = E::from_row(row).map_err(|err| {
                RepoError::InvalidData(format!(
                    "cannot read row of `{}`: {err}",
                    self.schema.table_name()
                ))
            })?;
            entities.push(entity);
        }
        Ok(entities)
    }
}
