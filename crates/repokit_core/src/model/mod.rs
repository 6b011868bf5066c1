//! Entity contract and query-composition building blocks.
//!
//! # Responsibility
//! - Define the base shape every persisted record shares.
//! - Provide the declarative pieces callers hand to repositories: predicates,
//!   inclusion directives, ordering clauses and schema descriptors.
//!
//! # Invariants
//! - Nothing in this module touches the store directly; inclusion loaders
//!   receive the session from the query pipeline.

pub mod entity;
pub mod inclusion;
pub mod ordering;
pub mod predicate;
pub mod predicate_builder;
pub mod schema;
pub mod value;
