//! Entity collections and the registry that owns them.
//!
//! A [`Collection`] is a named, schema-bearing source of rows: a table under an
//! alias, with an ordered column list, a primary key and the associations
//! declared on it. Collections live in a [`Registry`] arena keyed by alias.
//! Associations refer to their target by alias and resolve it through the
//! registry, so there are no owning references between collections.
//!
//! # Example
//!
//! ```
//! use tether::{AssociationOptions, CollectionOptions, ColumnType, Registry};
//!
//! let registry = Registry::new();
//! registry.build(
//!     "author",
//!     CollectionOptions::new()
//!         .column("id", ColumnType::Integer)
//!         .column("name", ColumnType::String),
//! );
//! registry.build(
//!     "article",
//!     CollectionOptions::new()
//!         .column("id", ColumnType::Integer)
//!         .column("author_id", ColumnType::Integer),
//! );
//! registry
//!     .has_many("author", "article", AssociationOptions::new().property("articles"))
//!     .unwrap();
//!
//! let author = registry.get("author").unwrap();
//! assert_eq!(author.table(), "authors");
//! assert!(author.association("article").is_some());
//! ```

use crate::executor::LifeError;
use crate::relation::{Association, AssociationOptions, RelationType};
use heck::ToSnakeCase;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Semantic type of a column, used to cast fetched values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Decimal,
    #[default]
    String,
    Text,
    Boolean,
    Date,
    DateTime,
    Uuid,
    Json,
    Binary,
}

impl ColumnType {
    /// Cast a fetched value to this column's type.
    ///
    /// Drivers without native booleans or JSON hand those back as integers or
    /// strings; this normalizes them. Values that do not parse are returned
    /// unchanged.
    pub fn cast(self, value: JsonValue) -> JsonValue {
        match (self, value) {
            (_, JsonValue::Null) => JsonValue::Null,
            (ColumnType::Boolean, JsonValue::Number(n)) => match n.as_i64() {
                Some(i) => JsonValue::Bool(i != 0),
                None => JsonValue::Number(n),
            },
            (ColumnType::Boolean, JsonValue::String(s)) => match s.as_str() {
                "t" | "true" | "1" => JsonValue::Bool(true),
                "f" | "false" | "0" => JsonValue::Bool(false),
                _ => JsonValue::String(s),
            },
            (
                ColumnType::SmallInteger | ColumnType::Integer | ColumnType::BigInteger,
                JsonValue::String(s),
            ) => {
                match s.trim().parse::<i64>() {
                    Ok(i) => JsonValue::from(i),
                    Err(_) => JsonValue::String(s),
                }
            }
            (ColumnType::Float, JsonValue::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) => JsonValue::from(f),
                Err(_) => JsonValue::String(s),
            },
            (ColumnType::Json, JsonValue::String(s)) => {
                serde_json::from_str(&s).unwrap_or(JsonValue::String(s))
            }
            (_, value) => value,
        }
    }
}

/// A column of a collection's schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// A named, schema-bearing source of rows
#[derive(Debug, Clone)]
pub struct Collection {
    alias: String,
    table: String,
    schema: Vec<Column>,
    primary_key: String,
    associations: Vec<Association>,
}

impl Collection {
    /// Alias used to qualify this collection's columns in queries
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Underlying table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in declaration order
    pub fn schema(&self) -> &[Column] {
        &self.schema
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.schema.iter().map(|c| c.name.as_str())
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Look up a declared association by name
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name() == name)
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }
}

/// Options for [`Registry::build`]
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    table: Option<String>,
    schema: Vec<Column>,
    primary_key: Option<String>,
    class_name: Option<String>,
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table name; defaults to the pluralized snake case alias
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Append a column to the schema
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.schema.push(Column {
            name: name.into(),
            column_type,
        });
        self
    }

    /// Primary key column; defaults to `id`
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Build the new collection as a copy of the one registered under
    /// `class_name` (same table, schema and associations, different alias)
    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }
}

/// Default table name for an alias: snake case, pluralized (`orderType` -> `order_types`)
pub fn tableize(alias: &str) -> String {
    pluralizer::pluralize(&alias.to_snake_case(), 2, false)
}

/// Singular snake case form of an alias, used for default foreign keys
pub fn singular_snake(alias: &str) -> String {
    pluralizer::pluralize(&alias.to_snake_case(), 1, false)
}

#[derive(Debug, Default)]
struct Arena {
    collections: Vec<Rc<Collection>>,
    index: HashMap<String, usize>,
}

/// Arena of collections indexed by alias.
///
/// Lookups hand out `Rc<Collection>` snapshots. Declaring an association on a
/// collection updates the arena entry; snapshots taken earlier keep the old
/// association list.
#[derive(Debug, Default)]
pub struct Registry {
    arena: RefCell<Arena>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the collection registered under `alias`, creating it from
    /// `options` if there is none. Building an existing alias is a no-op.
    pub fn build(&self, alias: &str, options: CollectionOptions) -> Rc<Collection> {
        if let Some(existing) = self.get(alias) {
            return existing;
        }

        let template = options
            .class_name
            .as_deref()
            .filter(|class| *class != alias)
            .and_then(|class| self.get(class));

        let collection = match template {
            Some(template) => {
                let mut copy = (*template).clone();
                copy.alias = alias.to_string();
                if let Some(table) = options.table {
                    copy.table = table;
                }
                // Associations declared on the template keep their source alias.
                for association in &mut copy.associations {
                    association.set_source(alias);
                }
                copy
            }
            None => Collection {
                alias: alias.to_string(),
                table: options.table.unwrap_or_else(|| tableize(alias)),
                schema: options.schema,
                primary_key: options.primary_key.unwrap_or_else(|| "id".to_string()),
                associations: Vec::new(),
            },
        };

        log::debug!(
            "registering collection {} (table {})",
            collection.alias,
            collection.table
        );

        let collection = Rc::new(collection);
        let mut arena = self.arena.borrow_mut();
        let idx = arena.collections.len();
        arena.collections.push(Rc::clone(&collection));
        arena.index.insert(alias.to_string(), idx);
        collection
    }

    pub fn get(&self, alias: &str) -> Option<Rc<Collection>> {
        let arena = self.arena.borrow();
        arena
            .index
            .get(alias)
            .map(|idx| Rc::clone(&arena.collections[*idx]))
    }

    /// Like [`Registry::get`], failing with `LifeError::UnknownCollection`
    pub fn collection(&self, alias: &str) -> Result<Rc<Collection>, LifeError> {
        self.get(alias)
            .ok_or_else(|| LifeError::UnknownCollection(alias.to_string()))
    }

    pub fn len(&self) -> usize {
        self.arena.borrow().collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered collection
    pub fn clear(&self) {
        let mut arena = self.arena.borrow_mut();
        arena.collections.clear();
        arena.index.clear();
    }

    /// Declare a many-to-one association: `source` holds the foreign key
    pub fn belongs_to(
        &self,
        source: &str,
        name: &str,
        options: AssociationOptions,
    ) -> Result<Association, LifeError> {
        self.associate(source, name, RelationType::BelongsTo, options)
    }

    /// Declare a one-to-one association owned by the target side
    pub fn has_one(
        &self,
        source: &str,
        name: &str,
        options: AssociationOptions,
    ) -> Result<Association, LifeError> {
        self.associate(source, name, RelationType::HasOne, options)
    }

    /// Declare a one-to-many association
    pub fn has_many(
        &self,
        source: &str,
        name: &str,
        options: AssociationOptions,
    ) -> Result<Association, LifeError> {
        self.associate(source, name, RelationType::HasMany, options)
    }

    fn associate(
        &self,
        source: &str,
        name: &str,
        rel_type: RelationType,
        options: AssociationOptions,
    ) -> Result<Association, LifeError> {
        let association = Association::new(name, rel_type, source, options);

        let mut arena = self.arena.borrow_mut();
        let idx = *arena
            .index
            .get(source)
            .ok_or_else(|| LifeError::UnknownCollection(source.to_string()))?;
        let collection = Rc::make_mut(&mut arena.collections[idx]);
        match collection
            .associations
            .iter_mut()
            .find(|a| a.name() == name)
        {
            Some(existing) => *existing = association.clone(),
            None => collection.associations.push(association.clone()),
        }

        log::debug!("{source} {rel_type:?} {name}");
        Ok(association)
    }
}
