//! Filter predicates as a tagged expression tree.
//!
//! # Responsibility
//! - Represent filters so they can be evaluated in memory or lowered to SQL.
//! - Keep built predicates immutable and cheap to clone across queries.
//!
//! # Invariants
//! - `Leaf` closures cannot be lowered; any tree containing one runs in memory.
//! - Both operands of `And`/`Or` may be evaluated; callers must not rely on
//!   short-circuiting.
//! - Equality is null-safe in both plans (`IS` / `IS NOT` in SQL).
//! - Ordering comparisons involving NULL are false in both plans.
//! - In memory, literals are converted to the column's storage class first.

use crate::model::entity::Entity;
use crate::model::schema::{quote_ident, EntitySchema};
use crate::model::value::{apply_affinity, compare_values, values_equal};
use crate::repo::error::RepoResult;
use rusqlite::types::Value;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Arbitrary in-memory test over an entity.
pub type PredicateFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "IS",
            Self::Ne => "IS NOT",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn holds(self, left: &Value, right: &Value) -> bool {
        let right = apply_affinity(left, right);
        let right = right.as_ref();
        match self {
            Self::Eq => values_equal(left, right),
            Self::Ne => !values_equal(left, right),
            _ if matches!(left, Value::Null) || matches!(right, Value::Null) => false,
            Self::Lt => compare_values(left, right) == Ordering::Less,
            Self::Le => compare_values(left, right) != Ordering::Greater,
            Self::Gt => compare_values(left, right) == Ordering::Greater,
            Self::Ge => compare_values(left, right) != Ordering::Less,
        }
    }
}

/// Boolean filter over an entity.
pub enum Predicate<E> {
    True,
    And(Box<Predicate<E>>, Box<Predicate<E>>),
    Or(Box<Predicate<E>>, Box<Predicate<E>>),
    Leaf(PredicateFn<E>),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
}

/// SQL `WHERE` fragment with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub sql: String,
    pub params: Vec<Value>,
}

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        match self {
            Self::True => Self::True,
            Self::And(left, right) => Self::And(left.clone(), right.clone()),
            Self::Or(left, right) => Self::Or(left.clone(), right.clone()),
            Self::Leaf(test) => Self::Leaf(Arc::clone(test)),
            Self::Compare { field, op, value } => Self::Compare {
                field: field.clone(),
                op: *op,
                value: value.clone(),
            },
            Self::In { field, values } => Self::In {
                field: field.clone(),
                values: values.clone(),
            },
        }
    }
}

impl<E> Debug for Predicate<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::And(left, right) => f.debug_tuple("And").field(left).field(right).finish(),
            Self::Or(left, right) => f.debug_tuple("Or").field(left).field(right).finish(),
            Self::Leaf(_) => write!(f, "Leaf(<fn>)"),
            Self::Compare { field, op, value } => f
                .debug_struct("Compare")
                .field("field", field)
                .field("op", op)
                .field("value", value)
                .finish(),
            Self::In { field, values } => f
                .debug_struct("In")
                .field("field", field)
                .field("values", values)
                .finish(),
        }
    }
}

impl<E> Default for Predicate<E> {
    fn default() -> Self {
        Self::True
    }
}

impl<E: Entity> Predicate<E> {
    pub fn always() -> Self {
        Self::True
    }

    /// Wraps an arbitrary closure. Forces in-memory evaluation.
    pub fn leaf(test: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self::Leaf(Arc::new(test))
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    /// Membership test; an empty list matches nothing.
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Predicate<E>) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate<E>) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Whether the whole tree can be expressed as SQL.
    pub fn is_lowerable(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::And(left, right) | Self::Or(left, right) => {
                left.is_lowerable() && right.is_lowerable()
            }
            Self::True | Self::Compare { .. } | Self::In { .. } => true,
        }
    }

    /// Fails on the first field name the schema does not know.
    pub(crate) fn check_fields(&self, schema: &EntitySchema<E>) -> RepoResult<()> {
        match self {
            Self::True | Self::Leaf(_) => Ok(()),
            Self::And(left, right) | Self::Or(left, right) => {
                left.check_fields(schema)?;
                right.check_fields(schema)
            }
            Self::Compare { field, .. } | Self::In { field, .. } => {
                schema.require_field(field).map(|_| ())
            }
        }
    }

    /// Evaluates the predicate against one entity.
    pub fn evaluate(&self, schema: &EntitySchema<E>, entity: &E) -> RepoResult<bool> {
        Ok(match self {
            Self::True => true,
            Self::And(left, right) => {
                let left = left.evaluate(schema, entity)?;
                let right = right.evaluate(schema, entity)?;
                left && right
            }
            Self::Or(left, right) => {
                let left = left.evaluate(schema, entity)?;
                let right = right.evaluate(schema, entity)?;
                left || right
            }
            Self::Leaf(test) => test(entity),
            Self::Compare { field, op, value } => {
                let current = schema.require_field(field)?.value(entity);
                op.holds(&current, value)
            }
            Self::In { field, values } => {
                // SQL `IN` never matches NULL
                let current = schema.require_field(field)?.value(entity);
                !matches!(current, Value::Null)
                    && values.iter().any(|candidate| {
                        values_equal(&current, &apply_affinity(&current, candidate))
                    })
            }
        })
    }

    /// Lowers the tree into a `WHERE` fragment, or `None` when it holds a
    /// `Leaf` closure.
    pub fn lower(&self, schema: &EntitySchema<E>) -> RepoResult<Option<SqlFilter>> {
        if !self.is_lowerable() {
            return Ok(None);
        }
        let mut params = Vec::new();
        let sql = self.lower_into(schema, &mut params)?;
        Ok(Some(SqlFilter { sql, params }))
    }

    fn lower_into(&self, schema: &EntitySchema<E>, params: &mut Vec<Value>) -> RepoResult<String> {
        Ok(match self {
            Self::True => "1 = 1".to_string(),
            Self::And(left, right) => {
                let left = left.lower_into(schema, params)?;
                let right = right.lower_into(schema, params)?;
                format!("({left} AND {right})")
            }
            Self::Or(left, right) => {
                let left = left.lower_into(schema, params)?;
                let right = right.lower_into(schema, params)?;
                format!("({left} OR {right})")
            }
            // is_lowerable() was checked by the caller
            Self::Leaf(_) => "1 = 1".to_string(),
            Self::Compare { field, op, value } => {
                let column = quote_ident(schema.require_field(field)?.name());
                params.push(value.clone());
                format!("{column} {} ?", op.sql())
            }
            Self::In { field, values } => {
                let column = quote_ident(schema.require_field(field)?.name());
                if values.is_empty() {
                    "0 = 1".to_string()
                } else {
                    params.extend(values.iter().cloned());
                    let placeholders = vec!["?"; values.len()].join(", ");
                    format!("{column} IN ({placeholders})")
                }
            }
        })
    }
}
