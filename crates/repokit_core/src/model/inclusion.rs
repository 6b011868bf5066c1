//! Eager-load directives.
//!
//! # Responsibility
//! - Carry typed relation handles and dotted string paths from callers to the
//!   query pipeline.
//! - Resolve string paths against the schema's named relations.
//!
//! # Invariants
//! - Directives apply in insertion order, typed ones before string paths.
//! - Duplicates are applied again; loaders must tolerate reloading.
//! - The repository borrows an inclusion for one call and never keeps it.

use crate::db::session::Session;
use crate::model::entity::Entity;
use crate::model::schema::{is_identifier, EntitySchema};
use crate::repo::error::{RepoError, RepoResult};
use std::fmt::{Debug, Formatter};

/// Loads one relation into a batch of already materialized entities.
///
/// The last argument is the remainder of a dotted include path
/// (`"lines"` for `"orders.lines"`), for loaders that support nesting.
pub type RelationLoader<E> = fn(&Session, &mut [E], Option<&str>) -> RepoResult<()>;

/// Typed handle to a related-object load.
pub struct Relation<E> {
    name: &'static str,
    load: RelationLoader<E>,
}

impl<E> Clone for Relation<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Relation<E> {}

impl<E> Debug for Relation<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation").field("name", &self.name).finish()
    }
}

impl<E: Entity> Relation<E> {
    pub const fn new(name: &'static str, load: RelationLoader<E>) -> Self {
        Self { name, load }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn load(
        &self,
        session: &Session,
        entities: &mut [E],
        nested: Option<&str>,
    ) -> RepoResult<()> {
        (self.load)(session, entities, nested)
    }
}

/// Ordered eager-load directives for one query.
pub struct Inclusion<E> {
    includes: Vec<Relation<E>>,
    include_paths: Vec<String>,
}

impl<E> Default for Inclusion<E> {
    fn default() -> Self {
        Self {
            includes: Vec::new(),
            include_paths: Vec::new(),
        }
    }
}

impl<E> Clone for Inclusion<E> {
    fn clone(&self) -> Self {
        Self {
            includes: self.includes.clone(),
            include_paths: self.include_paths.clone(),
        }
    }
}

impl<E> Debug for Inclusion<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inclusion")
            .field("includes", &self.includes)
            .field("include_paths", &self.include_paths)
            .finish()
    }
}

impl<E: Entity> Inclusion<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a typed relation.
    pub fn include(mut self, relation: Relation<E>) -> Self {
        self.includes.push(relation);
        self
    }

    /// Adds a dotted relation path such as `"orders.lines"`.
    pub fn include_path(mut self, path: impl Into<String>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn includes(&self) -> &[Relation<E>] {
        &self.includes
    }

    pub fn include_paths(&self) -> &[String] {
        &self.include_paths
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.include_paths.is_empty()
    }

    pub(crate) fn merge(&mut self, other: &Inclusion<E>) {
        self.includes.extend(other.includes.iter().copied());
        self.include_paths.extend(other.include_paths.iter().cloned());
    }

    /// Runs every directive against `entities`.
    ///
    /// String paths are resolved even when `entities` is empty, so a bad path
    /// fails the query regardless of how many rows it matched.
    pub(crate) fn apply(
        &self,
        session: &Session,
        schema: &EntitySchema<E>,
        entities: &mut [E],
    ) -> RepoResult<()> {
        let mut resolved = Vec::with_capacity(self.include_paths.len());
        for path in &self.include_paths {
            let (head, rest) = split_include_path(path)?;
            let relation = schema.relation(head).ok_or_else(|| {
                RepoError::invalid_argument(format!(
                    "unknown relation `{head}` on `{}`",
                    schema.table_name()
                ))
            })?;
            resolved.push((relation, rest));
        }

        if entities.is_empty() {
            return Ok(());
        }

        for relation in &self.includes {
            relation.load(session, entities, None)?;
        }
        for (relation, rest) in resolved {
            relation.load(session, entities, rest)?;
        }
        Ok(())
    }
}

/// Splits `"a.b.c"` into `("a", Some("b.c"))`, validating every segment.
pub fn split_include_path(path: &str) -> RepoResult<(&str, Option<&str>)> {
    let trimmed = path.trim();
    if trimmed.split('.').any(|segment| !is_identifier(segment)) {
        return Err(RepoError::invalid_argument(format!(
            "invalid include path `{path}`"
        )));
    }

    Ok(match trimmed.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (trimmed, None),
    })
}
