//! Incremental predicate composition.
//!
//! # Invariants
//! - Combination is strictly left to right: each step wraps the accumulated
//!   predicate as the left operand.
//! - `build()` returns a snapshot and leaves the builder usable.

use crate::model::entity::Entity;
use crate::model::predicate::Predicate;

/// Accumulates a filter from conditionally applied AND/OR branches.
///
/// ```ignore
/// let filter = PredicateBuilder::<Customer>::new()
///     .if_and(name.is_some(), Predicate::eq("name", name.clone()))
///     .if_or(include_vip, Predicate::ge("credit", 1000))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PredicateBuilder<E> {
    accumulated: Predicate<E>,
}

impl<E: Entity> Default for PredicateBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> PredicateBuilder<E> {
    /// Starts from the always-true predicate.
    pub fn new() -> Self {
        Self::with_base(Predicate::True)
    }

    pub fn with_base(base: Predicate<E>) -> Self {
        Self { accumulated: base }
    }

    /// ANDs `branch` in when `condition` holds.
    pub fn if_and(self, condition: bool, branch: Predicate<E>) -> Self {
        if condition {
            self.combine_and(branch)
        } else {
            self
        }
    }

    /// ORs `branch` in when `condition` holds.
    pub fn if_or(self, condition: bool, branch: Predicate<E>) -> Self {
        if condition {
            self.combine_or(branch)
        } else {
            self
        }
    }

    pub fn if_else_and(self, condition: bool, if_true: Predicate<E>, if_false: Predicate<E>) -> Self {
        self.combine_and(if condition { if_true } else { if_false })
    }

    pub fn if_else_or(self, condition: bool, if_true: Predicate<E>, if_false: Predicate<E>) -> Self {
        self.combine_or(if condition { if_true } else { if_false })
    }

    pub fn build(&self) -> Predicate<E> {
        self.accumulated.clone()
    }

    fn combine_and(self, branch: Predicate<E>) -> Self {
        Self {
            accumulated: self.accumulated.and(branch),
        }
    }

    fn combine_or(self, branch: Predicate<E>) -> Self {
        Self {
            accumulated: self.accumulated.or(branch),
        }
    }
}
