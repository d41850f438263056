//! SeaORM backend for `urlfilter-core`.
//!
//! - [`SqlBuilder`]: predicate builder producing a `sea_query::Condition`
//!   plus the `INNER JOIN`s the condition refers to
//! - [`build_select`] / [`build_count`]: one page of root rows and its total
//! - [`SeaOrmSearchRepository`]: runs both and eager-loads the fetch graph
//!   with one batched query per edge
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use urlfilter_core::{
//!     AccessScope, FilterSearch, Permission, QueryPlanner, SchemaRegistry, SearchSettings,
//!     SecurityContext,
//! };
//! use urlfilter_db::{connect, DatabaseConfig, SeaOrmSearchRepository};
//!
//! # async fn run(registry: Arc<SchemaRegistry>) -> anyhow::Result<()> {
//! let conn = connect(&DatabaseConfig::default()).await?;
//! let search = FilterSearch::new(
//!     SeaOrmSearchRepository::new(conn, registry.clone()),
//!     QueryPlanner::new(registry, SearchSettings::default()),
//! );
//! let params = [("f_name".to_string(), "Bob".to_string())].into();
//! let permission = Permission::new("users:read", "all");
//! let scope = AccessScope::new(permission, SecurityContext::anonymous());
//! let page = search.search("users", &params, &scope).await?;
//! println!("{}", page.page_info.total);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod builder;
pub mod config;
pub mod loader;
pub mod query;
pub mod repo;

pub use builder::{sea_value, JoinSpec, SqlBuilder, SqlPath, SqlPredicate};
pub use config::{connect, detect_backend, redact_credentials_in_dsn, DatabaseConfig, PoolCfg};
pub use loader::EagerLoader;
pub use query::{build_count, build_select};
pub use repo::SeaOrmSearchRepository;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("unsupported database type: {0}")]
    UnsupportedBackend(String),

    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),
}
