//! Textual ordering clauses (`"name desc, id asc"`).
//!
//! # Invariants
//! - Blank text means "no ordering".
//! - Each term is `<field> [asc|desc]`, direction case-insensitive, default
//!   ascending. Anything else is rejected at parse time.
//! - Field names are checked against the entity schema when a query runs,
//!   and SQL always uses the schema's canonical column name.

use crate::model::entity::{Entity, ID_COLUMN};
use crate::model::schema::{quote_ident, EntitySchema, FieldDef};
use crate::model::value::compare_values;
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::str::FromStr;

/// Ordering used when callers do not supply one.
pub const DEFAULT_ORDER_BY: &str = "id asc";

static ORDER_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\s+(asc|desc))?\s*$")
        .expect("valid order term regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: SortDirection,
}

/// Parsed ordering clause.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBy {
    terms: Vec<OrderTerm>,
}

impl OrderBy {
    /// Parses `text`; blank text yields an empty ordering.
    pub fn parse(text: &str) -> RepoResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut terms = Vec::new();
        for raw_term in text.split(',') {
            let captures = ORDER_TERM_RE.captures(raw_term).ok_or_else(|| {
                RepoError::invalid_argument(format!("malformed ordering clause `{text}`"))
            })?;
            let direction = match captures.get(2) {
                Some(direction) if direction.as_str().eq_ignore_ascii_case("desc") => {
                    SortDirection::Desc
                }
                _ => SortDirection::Asc,
            };
            terms.push(OrderTerm {
                field: captures[1].to_string(),
                direction,
            });
        }
        Ok(Self { terms })
    }

    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        Self::default().then(field, direction)
    }

    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.terms.push(OrderTerm {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn terms(&self) -> &[OrderTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Every direction flipped; an empty ordering becomes `id desc`.
    pub fn reversed(&self) -> Self {
        if self.terms.is_empty() {
            return Self::by(ID_COLUMN, SortDirection::Desc);
        }
        Self {
            terms: self
                .terms
                .iter()
                .map(|term| OrderTerm {
                    field: term.field.clone(),
                    direction: term.direction.reversed(),
                })
                .collect(),
        }
    }

    pub(crate) fn check_fields<E: Entity>(&self, schema: &EntitySchema<E>) -> RepoResult<()> {
        self.resolve(schema).map(|_| ())
    }

    /// `ORDER BY` clause with a leading space, or an empty string.
    pub(crate) fn to_sql<E: Entity>(&self, schema: &EntitySchema<E>) -> RepoResult<String> {
        if self.terms.is_empty() {
            return Ok(String::new());
        }
        let terms = self
            .resolve(schema)?
            .into_iter()
            .map(|(field, direction)| format!("{} {}", quote_ident(field.name()), direction.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(" ORDER BY {terms}"))
    }

    /// Stable in-memory sort equivalent to the SQL clause.
    pub(crate) fn sort<E: Entity>(&self, schema: &EntitySchema<E>, items: &mut [E]) -> RepoResult<()> {
        if self.terms.is_empty() {
            return Ok(());
        }
        let resolved = self.resolve(schema)?;
        items.sort_by(|left, right| {
            for (field, direction) in &resolved {
                let ordering = compare_values(&field.value(left), &field.value(right));
                let ordering = match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(())
    }

    fn resolve<'s, E: Entity>(
        &self,
        schema: &'s EntitySchema<E>,
    ) -> RepoResult<Vec<(&'s FieldDef<E>, SortDirection)>> {
        self.terms
            .iter()
            .map(|term| Ok((schema.require_field(&term.field)?, term.direction)))
            .collect()
    }
}

impl FromStr for OrderBy {
    type Err = RepoError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}
