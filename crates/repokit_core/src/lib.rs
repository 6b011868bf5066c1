//! Generic persistence layer over SQLite.
//! Entities, repositories, services and composable queries share one session
//! per unit of work.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{LoggingConfig, StoreConfig};
pub use db::migrations::Migration;
pub use db::query::{Projection, Query};
pub use db::session::Session;
pub use db::{
    open_session, open_session_in_memory, open_session_with_config, DbError, DbResult,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{new_string_key, now_epoch_ms, BaseFields, Entity, EntityKey};
pub use model::inclusion::{Inclusion, Relation, RelationLoader};
pub use model::ordering::{OrderBy, SortDirection};
pub use model::predicate::{CompareOp, Predicate};
pub use model::predicate_builder::PredicateBuilder;
pub use model::schema::{EntitySchema, SchemaError};
pub use repo::base_repo::{DeleteMode, ListQuery, Page, Repository, SqliteRepository};
pub use repo::error::{RepoError, RepoResult};
pub use service::base_service::EntityService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
