//! Generic repository contract and its SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, listing, paging and bulk operations for any registered
//!   entity type.
//! - Translate entity writes into staged session commands.
//!
//! # Invariants
//! - Every mutating operation stages its commands, then saves immediately
//!   when `auto_commit` is true.
//! - Every update path refreshes `updated_at` and never moves it backwards.
//! - Bulk update/delete without a filter is rejected, never applied to the
//!   whole table.
//! - Reads never filter soft-deleted rows on their own.

use crate::db::query::{Projection, Query};
use crate::db::session::{Command, CommandKind, Session};
use crate::model::entity::{Entity, EntityKey, ID_COLUMN, UPDATED_AT_COLUMN};
use crate::model::inclusion::Inclusion;
use crate::model::ordering::{OrderBy, DEFAULT_ORDER_BY};
use crate::model::predicate::Predicate;
use crate::model::schema::{quote_ident, EntitySchema};
use crate::model::value::values_equal;
use crate::repo::error::{RepoError, RepoResult};
use log::debug;
use serde::Serialize;

/// Read options shared by listing and paging.
pub struct ListQuery<E: Entity> {
    /// `None` matches every row.
    pub filter: Option<Predicate<E>>,
    pub inclusion: Option<Inclusion<E>>,
    /// Ordering text; `None` falls back to `id asc`, blank text means unordered.
    pub order_by: Option<String>,
    /// `None` returns entities unchanged.
    pub projection: Option<Projection<E>>,
    pub track_changes: bool,
}

impl<E: Entity> Default for ListQuery<E> {
    fn default() -> Self {
        Self {
            filter: None,
            inclusion: None,
            order_by: None,
            projection: None,
            track_changes: false,
        }
    }
}

impl<E: Entity> Clone for ListQuery<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            inclusion: self.inclusion.clone(),
            order_by: self.order_by.clone(),
            projection: self.projection.clone(),
            track_changes: self.track_changes,
        }
    }
}

impl<E: Entity> ListQuery<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Predicate<E>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_inclusion(mut self, inclusion: Inclusion<E>) -> Self {
        self.inclusion = Some(inclusion);
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_projection(mut self, projection: Projection<E>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_tracking(mut self, track_changes: bool) -> Self {
        self.track_changes = track_changes;
        self
    }
}

/// One window of a filtered, ordered listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<E> {
    pub items: Vec<E>,
    /// Rows matching the filter before the window was applied.
    pub total_rows: usize,
    pub page_number: i64,
    pub page_size: i64,
}

impl<E> Page<E> {
    pub fn total_pages(&self) -> usize {
        if self.page_size <= 0 {
            return 0;
        }
        let size = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        self.total_rows.div_ceil(size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Set `is_deleted = 1` and keep the row.
    #[default]
    Soft,
    /// Remove the row.
    Hard,
}

/// Data access contract for one entity type.
pub trait Repository<E: Entity> {
    /// Session shared by every repository built from it.
    fn session(&self) -> &Session;

    fn table_name(&self) -> &'static str;

    fn get_by_id(
        &self,
        id: &E::Key,
        inclusion: Option<&Inclusion<E>>,
        track_changes: bool,
    ) -> RepoResult<Option<E>>;

    fn get_list(&self, query: &ListQuery<E>) -> RepoResult<Vec<E>>;

    /// `page_number <= 0` reads page 1; `page_size < 0` yields an empty page.
    fn get_page(&self, page_number: i64, page_size: i64, query: &ListQuery<E>)
        -> RepoResult<Page<E>>;

    /// Without a filter: whether the table has any row.
    fn exists(&self, filter: Option<&Predicate<E>>) -> RepoResult<bool>;

    /// Last matching row in `id asc` order.
    fn last_or_default(&self, filter: Option<&Predicate<E>>) -> RepoResult<Option<E>>;

    /// Largest selected value over every row, `None` for an empty table.
    fn max<R, F>(&self, selector: F) -> RepoResult<Option<R>>
    where
        R: PartialOrd,
        F: Fn(&E) -> R;

    fn add(&self, entity: E, auto_commit: bool) -> RepoResult<E>;

    /// Returns the number of staged inserts.
    fn add_range<I>(&self, entities: I, auto_commit: bool) -> RepoResult<usize>
    where
        I: IntoIterator<Item = E>;

    /// Updates when a row with the same key exists, inserts otherwise.
    fn add_or_update(&self, entity: E, auto_commit: bool) -> RepoResult<E>;

    fn update(&self, entity: E, auto_commit: bool) -> RepoResult<E>;

    /// Applies `mutator` to every row matching `filter`.
    ///
    /// # Errors
    /// - `InvalidArgument` when either `filter` or `mutator` is missing.
    fn update_where<F>(
        &self,
        filter: Option<&Predicate<E>>,
        mutator: Option<F>,
        auto_commit: bool,
    ) -> RepoResult<usize>
    where
        F: FnMut(&mut E);

    /// Stages every present entity; `None` entries are skipped.
    fn update_range<I, T>(&self, entities: I, auto_commit: bool) -> RepoResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<E>>;

    fn delete(&self, entity: &mut E, mode: DeleteMode, auto_commit: bool) -> RepoResult<()>;

    /// Returns `false` when no row has this key; nothing is staged then.
    fn delete_by_id(&self, id: &E::Key, mode: DeleteMode, auto_commit: bool) -> RepoResult<bool>;

    /// # Errors
    /// - `InvalidArgument` when `filter` is missing.
    fn delete_where(
        &self,
        filter: Option<&Predicate<E>>,
        mode: DeleteMode,
        auto_commit: bool,
    ) -> RepoResult<usize>;

    /// Flushes every staged command on the shared session.
    fn save(&self) -> RepoResult<usize>;
}

/// SQLite-backed repository over a registered entity schema.
pub struct SqliteRepository<'s, E: Entity> {
    session: &'s Session,
    schema: &'s EntitySchema<E>,
}

impl<'s, E: Entity> SqliteRepository<'s, E> {
    /// Fails with `UnregisteredEntity` when `E` has no schema on `session`.
    pub fn try_new(session: &'s Session) -> RepoResult<Self> {
        Ok(Self {
            session,
            schema: session.schema::<E>()?,
        })
    }

    pub fn schema(&self) -> &'s EntitySchema<E> {
        self.schema
    }

    fn query(&self) -> Query<'s, E> {
        Query::new(self.session, self.schema)
    }

    fn list_query(&self, query: &ListQuery<E>) -> RepoResult<Query<'s, E>> {
        let order_by = OrderBy::parse(query.order_by.as_deref().unwrap_or(DEFAULT_ORDER_BY))?;
        let mut built = self
            .query()
            .order_by(order_by)
            .tracked(query.track_changes);
        if let Some(inclusion) = &query.inclusion {
            built = built.include(inclusion);
        }
        if let Some(filter) = &query.filter {
            built = built.filter(filter.clone());
        }
        if let Some(projection) = &query.projection {
            built = built.select(projection.clone());
        }
        Ok(built)
    }

    fn filtered(&self, filter: Option<&Predicate<E>>) -> Query<'s, E> {
        match filter {
            Some(filter) => self.query().filter(filter.clone()),
            None => self.query(),
        }
    }

    fn stage_insert(&self, entity: &E) {
        let columns = self.schema.columns().map(quote_ident).collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote_ident(self.schema.table_name()),
            columns.join(", "),
            placeholders
        );
        self.session.stage(Command {
            kind: CommandKind::Insert,
            table: self.schema.table_name(),
            key: entity.id().to_value(),
            sql,
            params: self.schema.values(entity),
            snapshot: None,
        });
    }

    /// Writes only the columns that differ from the tracked snapshot (or the
    /// newest staged update of the same row), or every non-key column when the
    /// entity is untracked. `updated_at` is always written.
    fn stage_update(&self, entity: &E) {
        let table = self.schema.table_name();
        let key = entity.id().to_value();
        let values = self.schema.values(entity);
        let snapshot = self.session.latest_snapshot(table, &key);

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (index, (field, value)) in self.schema.fields().iter().zip(&values).enumerate() {
            if field.name() == ID_COLUMN {
                continue;
            }
            let dirty = match &snapshot {
                Some(previous) => previous
                    .get(index)
                    .map_or(true, |previous| !values_equal(previous, value)),
                None => true,
            };
            if dirty || field.name() == UPDATED_AT_COLUMN {
                assignments.push(format!("{} = ?", quote_ident(field.name())));
                params.push(value.clone());
            }
        }
        params.push(key.clone());

        debug!(
            "event=update_plan module=repo table={} tracked={} columns={}",
            table,
            snapshot.is_some(),
            assignments.len()
        );

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?;",
            quote_ident(table),
            assignments.join(", "),
            quote_ident(ID_COLUMN)
        );
        self.session.stage(Command {
            kind: CommandKind::Update,
            table,
            key,
            sql,
            params,
            snapshot: Some(values),
        });
    }

    fn stage_delete(&self, entity: &mut E, mode: DeleteMode) {
        match mode {
            DeleteMode::Soft => {
                entity.base_mut().mark_deleted();
                entity.base_mut().touch();
                self.stage_update(entity);
            }
            DeleteMode::Hard => {
                let table = self.schema.table_name();
                let key = entity.id().to_value();
                self.session.stage(Command {
                    kind: CommandKind::Delete,
                    table,
                    key: key.clone(),
                    sql: format!(
                        "DELETE FROM {} WHERE {} = ?;",
                        quote_ident(table),
                        quote_ident(ID_COLUMN)
                    ),
                    params: vec![key],
                    snapshot: None,
                });
            }
        }
    }

    fn finish(&self, auto_commit: bool) -> RepoResult<()> {
        if auto_commit {
            self.session.save()?;
        }
        Ok(())
    }
}

impl<'s, E: Entity> Repository<E> for SqliteRepository<'s, E> {
    fn session(&self) -> &Session {
        self.session
    }

    fn table_name(&self) -> &'static str {
        self.schema.table_name()
    }

    fn get_by_id(
        &self,
        id: &E::Key,
        inclusion: Option<&Inclusion<E>>,
        track_changes: bool,
    ) -> RepoResult<Option<E>> {
        let mut query = self
            .query()
            .filter(Predicate::eq(ID_COLUMN, id.to_value()))
            .tracked(track_changes);
        if let Some(inclusion) = inclusion {
            query = query.include(inclusion);
        }
        query.first()
    }

    fn get_list(&self, query: &ListQuery<E>) -> RepoResult<Vec<E>> {
        self.list_query(query)?.to_list()
    }

    fn get_page(
        &self,
        page_number: i64,
        page_size: i64,
        query: &ListQuery<E>,
    ) -> RepoResult<Page<E>> {
        let page_number = page_number.max(1);
        let page_size = page_size.max(0);

        let built = self.list_query(query)?;
        let total_rows = built.count()?;

        let size = usize::try_from(page_size).unwrap_or(usize::MAX);
        let skip = usize::try_from(page_number - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(size);
        let items = built.skip(skip).take(size).to_list()?;

        Ok(Page {
            items,
            total_rows,
            page_number,
            page_size,
        })
    }

    fn exists(&self, filter: Option<&Predicate<E>>) -> RepoResult<bool> {
        self.filtered(filter).any()
    }

    fn last_or_default(&self, filter: Option<&Predicate<E>>) -> RepoResult<Option<E>> {
        self.filtered(filter)
            .order_by(OrderBy::parse(DEFAULT_ORDER_BY)?)
            .last()
    }

    fn max<R, F>(&self, selector: F) -> RepoResult<Option<R>>
    where
        R: PartialOrd,
        F: Fn(&E) -> R,
    {
        let rows = self.query().to_list()?;
        Ok(rows.iter().map(selector).fold(None, |best, candidate| match best {
            Some(best) if best >= candidate => Some(best),
            _ => Some(candidate),
        }))
    }

    fn add(&self, entity: E, auto_commit: bool) -> RepoResult<E> {
        self.stage_insert(&entity);
        self.finish(auto_commit)?;
        Ok(entity)
    }

    fn add_range<I>(&self, entities: I, auto_commit: bool) -> RepoResult<usize>
    where
        I: IntoIterator<Item = E>,
    {
        let mut staged = 0;
        for entity in entities {
            self.stage_insert(&entity);
            staged += 1;
        }
        self.finish(auto_commit)?;
        Ok(staged)
    }

    fn add_or_update(&self, entity: E, auto_commit: bool) -> RepoResult<E> {
        if self.get_by_id(entity.id(), None, false)?.is_some() {
            self.update(entity, auto_commit)
        } else {
            self.add(entity, auto_commit)
        }
    }

    fn update(&self, mut entity: E, auto_commit: bool) -> RepoResult<E> {
        entity.base_mut().touch();
        self.stage_update(&entity);
        self.finish(auto_commit)?;
        Ok(entity)
    }

    fn update_where<F>(
        &self,
        filter: Option<&Predicate<E>>,
        mutator: Option<F>,
        auto_commit: bool,
    ) -> RepoResult<usize>
    where
        F: FnMut(&mut E),
    {
        let filter = filter.ok_or_else(|| {
            RepoError::invalid_argument("update_where requires a filter")
        })?;
        let mut mutator = mutator.ok_or_else(|| {
            RepoError::invalid_argument("update_where requires a mutator")
        })?;

        let mut rows = self.query().filter(filter.clone()).to_list()?;
        for entity in &mut rows {
            mutator(entity);
            entity.base_mut().touch();
            self.stage_update(entity);
        }
        self.finish(auto_commit)?;
        Ok(rows.len())
    }

    fn update_range<I, T>(&self, entities: I, auto_commit: bool) -> RepoResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<E>>,
    {
        let mut staged = 0;
        for item in entities {
            let entity: Option<E> = item.into();
            if let Some(mut entity) = entity {
                entity.base_mut().touch();
                self.stage_update(&entity);
                staged += 1;
            }
        }
        self.finish(auto_commit)?;
        Ok(staged)
    }

    fn delete(&self, entity: &mut E, mode: DeleteMode, auto_commit: bool) -> RepoResult<()> {
        self.stage_delete(entity, mode);
        self.finish(auto_commit)
    }

    fn delete_by_id(&self, id: &E::Key, mode: DeleteMode, auto_commit: bool) -> RepoResult<bool> {
        match self.get_by_id(id, None, false)? {
            Some(mut entity) => {
                self.delete(&mut entity, mode, auto_commit)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_where(
        &self,
        filter: Option<&Predicate<E>>,
        mode: DeleteMode,
        auto_commit: bool,
    ) -> RepoResult<usize> {
        let filter = filter.ok_or_else(|| {
            RepoError::invalid_argument("delete_where requires a filter")
        })?;

        let mut rows = self.query().filter(filter.clone()).to_list()?;
        for entity in &mut rows {
            self.stage_delete(entity, mode);
        }
        self.finish(auto_commit)?;
        Ok(rows.len())
    }

    fn save(&self) -> RepoResult<usize> {
        self.session.save()
    }
}
