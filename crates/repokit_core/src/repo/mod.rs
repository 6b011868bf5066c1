//! Repository layer: generic data access over registered entity schemas.
//!
//! # Responsibility
//! - Define the entity-agnostic data access contract.
//! - Keep SQL assembly and command staging out of service orchestration.
//!
//! # Invariants
//! - Repositories return semantic errors (`InvalidArgument`,
//!   `UnregisteredEntity`) in addition to store transport errors.
//! - Not-found is reported as `None`/`false`, never as an error.

pub mod base_repo;
pub mod error;
