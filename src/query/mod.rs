//! Query building and execution with association containment.
//!
//! This module provides the query builder over registered collections, the
//! containment spec types, and the machinery that turns containments into
//! joins and follow-up statements.
//!
//! # Architecture
//!
//! - **Select**: Query builder (`Query`) and field aliasing
//! - **Contain**: Containment specs (`Contain`, `ContainOptions`) and their JSON form
//! - **Normalize**: Resolving specs against the association graph (`ContainNode`)
//! - **Planner**: Joins and deferred loads (`CompiledQuery`)
//! - **Execution**: Running a compiled query and its deferred loads
//! - **Result**: Buffering, hydration and merge stages (`ResultSet`)
//! - **Value Conversion**: SeaQuery Value to ToSql parameter conversion
//!
//! # Examples
//!
//! ```no_run
//! use tether::{connect, AssociationOptions, CollectionOptions, ColumnType, MayPostgresExecutor, Query, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new();
//! registry.build("author", CollectionOptions::new().column("id", ColumnType::Integer));
//! registry.build(
//!     "article",
//!     CollectionOptions::new()
//!         .column("id", ColumnType::Integer)
//!         .column("author_id", ColumnType::Integer),
//! );
//! registry.has_many("author", "article", AssociationOptions::new().property("articles"))?;
//!
//! let executor = MayPostgresExecutor::new(connect("postgresql://localhost/blog")?);
//! for author in Query::new().repository("author").contain("article").execute(&registry, &executor)? {
//!     println!("{}", serde_json::Value::Object(author?));
//! }
//! # Ok(())
//! # }
//! ```

// Filter predicates
pub mod predicate;
#[doc(inline)]
pub use predicate::Predicate;

// Value conversion utilities
pub(crate) mod value_conversion;

// Containment specs
pub mod contain;
#[doc(inline)]
pub use contain::{Contain, ContainOptions, Fields, IntoContain, SortOrder, Strategy};

// Normalized containment trees
pub mod normalize;
#[doc(inline)]
pub use normalize::{ContainNode, NodeConfig};

// Join planning
pub mod planner;
#[doc(inline)]
pub use planner::{resolve_first_level, CompiledQuery, Deferred, JoinClause};

// SELECT query builder
pub mod select;
#[doc(inline)]
pub use select::{alias_field, alias_fields, Field, Query};

// Query execution methods
pub mod execution;

// Result decoration
pub mod result;
#[doc(inline)]
pub use result::{BufferedCursor, Hydrator, ResultSet, RowPipeline};
