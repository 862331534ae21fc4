//! Relation module for associations between collections.
//!
//! This module provides support for declaring and loading associations:
//! - belongs_to: Many-to-one relationship, the source holds the foreign key
//! - has_one: One-to-one relationship, the target holds the foreign key
//! - has_many: One-to-many relationship, loaded with a follow-up statement
//!
//! # Architecture
//!
//! - **Def**: Association definitions (`Association`, `AssociationOptions`, `RelationType`)
//!   and attaching joinable associations to a compiled query
//! - **Eager**: Loading non-joinable associations for a batch of parent rows and
//!   merging the results back into them

// Association definitions
pub mod def;
#[doc(inline)]
pub use def::{Association, AssociationOptions, JoinKind, RelationType};

// Eager loading
pub mod eager;
#[doc(inline)]
pub use eager::MergeFn;
