//! # Tether
//!
//! Association containment and eager loading over sea-query.
//!
//! Collections are registered in a [`Registry`] together with the
//! associations between them. A [`Query`] names the associations to load
//! with [`Query::contain`]; one-to-one associations are joined onto the main
//! statement and one-to-many associations are loaded with one follow-up
//! statement per association, then merged into the fetched records.
//!
//! ```
//! use tether::{AssociationOptions, CollectionOptions, Query, Registry};
//!
//! let registry = Registry::new();
//! registry.build("article", CollectionOptions::new());
//! registry.build("author", CollectionOptions::new());
//! registry.belongs_to("article", "author", AssociationOptions::new()).unwrap();
//!
//! let sql = Query::new()
//!     .repository("article")
//!     .select(["id", "title", "author_id"])
//!     .contain("author")
//!     .sql(&registry, tether::Backend::Postgres)
//!     .unwrap();
//! assert!(sql.contains(r#"LEFT JOIN "authors" AS "author" ON "author"."id" = "article"."author_id""#));
//! ```

pub mod collection;
pub mod config;
pub mod connection;
pub mod executor;
pub mod metrics;
pub mod query;
pub mod relation;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use collection::{tableize, Collection, CollectionOptions, Column, ColumnType, Registry};
pub use config::DatabaseConfig;
pub use connection::{connect, ConnectionError};
pub use executor::{
    Backend, LifeError, LifeExecutor, MayPostgresExecutor, Record, RowCursor, VecCursor,
};
pub use query::{
    CompiledQuery, Contain, ContainOptions, Fields, IntoContain, Predicate, Query, ResultSet,
    SortOrder, Strategy,
};
pub use relation::{Association, AssociationOptions, JoinKind, RelationType};
