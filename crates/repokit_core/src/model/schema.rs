//! Typed schema descriptors registered once per entity type.
//!
//! # Responsibility
//! - Map an entity type to its table, its column accessors and its named
//!   relations.
//! - Validate identifiers up front so query paths can interpolate them.
//!
//! # Invariants
//! - Base columns (`id`, `created_at`, `updated_at`, `is_deleted`) always come
//!   first, in that order.
//! - Field and relation names are unique (ASCII case-insensitive) and match
//!   `[A-Za-z_][A-Za-z0-9_]*`.

use crate::model::entity::{
    Entity, EntityKey, CREATED_AT_COLUMN, ID_COLUMN, IS_DELETED_COLUMN, UPDATED_AT_COLUMN,
};
use crate::model::inclusion::Relation;
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex")
});

/// Reads one column value from an entity.
pub type FieldGetter<E> = fn(&E) -> Value;

/// Schema construction and registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidIdentifier { table: String, identifier: String },
    DuplicateField { table: &'static str, field: &'static str },
    DuplicateRelation { table: &'static str, relation: &'static str },
    /// The session already holds a schema for this entity type.
    AlreadyRegistered(&'static str),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier { table, identifier } => {
                write!(f, "invalid identifier `{identifier}` in schema `{table}`")
            }
            Self::DuplicateField { table, field } => {
                write!(f, "field `{field}` declared twice in schema `{table}`")
            }
            Self::DuplicateRelation { table, relation } => {
                write!(f, "relation `{relation}` declared twice in schema `{table}`")
            }
            Self::AlreadyRegistered(type_name) => {
                write!(f, "schema for `{type_name}` is already registered")
            }
        }
    }
}

impl Error for SchemaError {}

pub(crate) fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

/// One named column with its accessor.
pub struct FieldDef<E> {
    name: &'static str,
    get: FieldGetter<E>,
}

impl<E> FieldDef<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self, entity: &E) -> Value {
        (self.get)(entity)
    }
}

/// Table, columns and relations of one entity type.
pub struct EntitySchema<E: Entity> {
    table: &'static str,
    fields: Vec<FieldDef<E>>,
    relations: Vec<Relation<E>>,
    select_sql: String,
}

impl<E: Entity> EntitySchema<E> {
    /// Starts a schema for `table` with the base columns already declared.
    pub fn builder(table: &'static str) -> EntitySchemaBuilder<E> {
        EntitySchemaBuilder::new(table)
    }

    pub fn table_name(&self) -> &'static str {
        self.table
    }

    pub fn fields(&self) -> &[FieldDef<E>] {
        &self.fields
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(FieldDef::name)
    }

    /// Looks up a field by name, ignoring ASCII case.
    pub fn field(&self, name: &str) -> Option<&FieldDef<E>> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a relation by name, ignoring ASCII case.
    pub fn relation(&self, name: &str) -> Option<&Relation<E>> {
        self.relations
            .iter()
            .find(|relation| relation.name().eq_ignore_ascii_case(name))
    }

    /// Column values of `entity`, in column order.
    pub fn values(&self, entity: &E) -> Vec<Value> {
        self.fields.iter().map(|field| field.value(entity)).collect()
    }

    pub(crate) fn require_field(&self, name: &str) -> RepoResult<&FieldDef<E>> {
        self.field(name).ok_or_else(|| {
            RepoError::invalid_argument(format!(
                "unknown field `{name}` on `{}`",
                self.table
            ))
        })
    }

    pub(crate) fn select_sql(&self) -> &str {
        &self.select_sql
    }
}

/// Collects fields and relations, validating them on `build()`.
pub struct EntitySchemaBuilder<E: Entity> {
    table: &'static str,
    fields: Vec<FieldDef<E>>,
    relations: Vec<Relation<E>>,
}

impl<E: Entity> EntitySchemaBuilder<E> {
    fn new(table: &'static str) -> Self {
        let fields = vec![
            FieldDef {
                name: ID_COLUMN,
                get: |entity: &E| entity.base().id.to_value(),
            },
            FieldDef {
                name: CREATED_AT_COLUMN,
                get: |entity: &E| Value::Integer(entity.base().created_at),
            },
            FieldDef {
                name: UPDATED_AT_COLUMN,
                get: |entity: &E| Value::Integer(entity.base().updated_at),
            },
            FieldDef {
                name: IS_DELETED_COLUMN,
                get: |entity: &E| Value::Integer(i64::from(entity.base().is_deleted)),
            },
        ];
        Self {
            table,
            fields,
            relations: Vec::new(),
        }
    }

    /// Declares an entity-specific column.
    pub fn field(mut self, name: &'static str, get: FieldGetter<E>) -> Self {
        self.fields.push(FieldDef { name, get });
        self
    }

    /// Declares a relation that string include paths can resolve by name.
    pub fn relation(mut self, relation: Relation<E>) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn build(self) -> Result<EntitySchema<E>, SchemaError> {
        let invalid = |identifier: &str| SchemaError::InvalidIdentifier {
            table: self.table.to_string(),
            identifier: identifier.to_string(),
        };

        if !is_identifier(self.table) {
            return Err(invalid(self.table));
        }

        for (index, field) in self.fields.iter().enumerate() {
            if !is_identifier(field.name) {
                return Err(invalid(field.name));
            }
            if self.fields[..index]
                .iter()
                .any(|earlier| earlier.name.eq_ignore_ascii_case(field.name))
            {
                return Err(SchemaError::DuplicateField {
                    table: self.table,
                    field: field.name,
                });
            }
        }

        for (index, relation) in self.relations.iter().enumerate() {
            if !is_identifier(relation.name()) {
                return Err(invalid(relation.name()));
            }
            if self.relations[..index]
                .iter()
                .any(|earlier| earlier.name().eq_ignore_ascii_case(relation.name()))
            {
                return Err(SchemaError::DuplicateRelation {
                    table: self.table,
                    relation: relation.name(),
                });
            }
        }

        let columns = self
            .fields
            .iter()
            .map(|field| quote_ident(field.name))
            .collect::<Vec<_>>()
            .join(", ");
        let select_sql = format!("SELECT {columns} FROM {}", quote_ident(self.table));

        Ok(EntitySchema {
            table: self.table,
            fields: self.fields,
            relations: self.relations,
            select_sql,
        })
    }
}
