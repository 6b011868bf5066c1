//! Generic entity service.
//!
//! # Responsibility
//! - Forward every repository operation for one entity type.
//! - Treat absent inputs as no-ops instead of errors.
//!
//! # Invariants
//! - `None` or empty inputs never reach the store.
//! - Service APIs never bypass repository persistence contracts.

use crate::db::session::Session;
use crate::model::entity::Entity;
use crate::model::inclusion::Inclusion;
use crate::model::predicate::Predicate;
use crate::repo::base_repo::{DeleteMode, ListQuery, Page, Repository};
use crate::repo::error::RepoResult;
use std::marker::PhantomData;

/// Use-case wrapper around exactly one repository.
pub struct EntityService<E: Entity, R: Repository<E>> {
    repo: R,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, R: Repository<E>> EntityService<E, R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            _entity: PhantomData,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn session(&self) -> &Session {
        self.repo.session()
    }

    pub fn table_name(&self) -> &'static str {
        self.repo.table_name()
    }

    pub fn get_by_id(
        &self,
        id: &E::Key,
        inclusion: Option<&Inclusion<E>>,
        track_changes: bool,
    ) -> RepoResult<Option<E>> {
        self.repo.get_by_id(id, inclusion, track_changes)
    }

    pub fn get_list(&self, query: &ListQuery<E>) -> RepoResult<Vec<E>> {
        self.repo.get_list(query)
    }

    pub fn get_page(
        &self,
        page_number: i64,
        page_size: i64,
        query: &ListQuery<E>,
    ) -> RepoResult<Page<E>> {
        self.repo.get_page(page_number, page_size, query)
    }

    pub fn exists(&self, filter: Option<&Predicate<E>>) -> RepoResult<bool> {
        self.repo.exists(filter)
    }

    pub fn last_or_default(&self, filter: Option<&Predicate<E>>) -> RepoResult<Option<E>> {
        self.repo.last_or_default(filter)
    }

    pub fn max<T, F>(&self, selector: F) -> RepoResult<Option<T>>
    where
        T: PartialOrd,
        F: Fn(&E) -> T,
    {
        self.repo.max(selector)
    }

    /// Returns `Ok(None)` without touching the store when `entity` is absent.
    pub fn add(&self, entity: Option<E>, auto_commit: bool) -> RepoResult<Option<E>> {
        match entity {
            Some(entity) => self.repo.add(entity, auto_commit).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the number of staged inserts; 0 for `None` or an empty list.
    pub fn add_range<I>(&self, entities: Option<I>, auto_commit: bool) -> RepoResult<usize>
    where
        I: IntoIterator<Item = E>,
    {
        let Some(entities) = entities else {
            return Ok(0);
        };
        let mut entities = entities.into_iter().peekable();
        if entities.peek().is_none() {
            return Ok(0);
        }
        self.repo.add_range(entities, auto_commit)
    }

    pub fn add_or_update(&self, entity: Option<E>, auto_commit: bool) -> RepoResult<Option<E>> {
        match entity {
            Some(entity) => self.repo.add_or_update(entity, auto_commit).map(Some),
            None => Ok(None),
        }
    }

    pub fn update(&self, entity: Option<E>, auto_commit: bool) -> RepoResult<Option<E>> {
        match entity {
            Some(entity) => self.repo.update(entity, auto_commit).map(Some),
            None => Ok(None),
        }
    }

    pub fn update_where<F>(
        &self,
        filter: Option<&Predicate<E>>,
        mutator: Option<F>,
        auto_commit: bool,
    ) -> RepoResult<usize>
    where
        F: FnMut(&mut E),
    {
        self.repo.update_where(filter, mutator, auto_commit)
    }

    pub fn update_range<I, T>(&self, entities: Option<I>, auto_commit: bool) -> RepoResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<E>>,
    {
        let Some(entities) = entities else {
            return Ok(0);
        };
        let mut entities = entities.into_iter().peekable();
        if entities.peek().is_none() {
            return Ok(0);
        }
        self.repo.update_range(entities, auto_commit)
    }

    pub fn delete(
        &self,
        entity: Option<&mut E>,
        mode: DeleteMode,
        auto_commit: bool,
    ) -> RepoResult<()> {
        match entity {
            Some(entity) => self.repo.delete(entity, mode, auto_commit),
            None => Ok(()),
        }
    }

    pub fn delete_by_id(&self, id: &E::Key, mode: DeleteMode, auto_commit: bool) -> RepoResult<bool> {
        self.repo.delete_by_id(id, mode, auto_commit)
    }

    pub fn delete_where(
        &self,
        filter: Option<&Predicate<E>>,
        mode: DeleteMode,
        auto_commit: bool,
    ) -> RepoResult<usize> {
        self.repo.delete_where(filter, mode, auto_commit)
    }

    pub fn save(&self) -> RepoResult<usize> {
        self.repo.save()
    }
}
