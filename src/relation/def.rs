//! Association definitions.
//!
//! An [`Association`] describes one relationship between a source collection
//! and a target collection: its kind, the foreign key linking them, static
//! conditions, how it is joined and where the related data lands in a fetched
//! record. It is the unit the join planner and the eager loader work with.

use crate::collection::{singular_snake, Collection, Registry};
use crate::query::normalize::ContainNode;
use crate::query::planner::{CompiledQuery, JoinClause};
use crate::query::predicate::{qualify, Predicate};
use crate::query::contain::Fields;
use crate::query::select::{alias_field, Field};
use std::rc::Rc;

/// Type of relationship between collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one, the target holds the foreign key
    HasOne,
    /// One-to-many, the target holds the foreign key
    HasMany,
    /// Many-to-one (one-to-one owning side), the source holds the foreign key
    BelongsTo,
}

impl RelationType {
    /// Join type used when none is configured
    pub fn default_join_type(self) -> JoinKind {
        match self {
            RelationType::HasOne => JoinKind::Inner,
            RelationType::BelongsTo | RelationType::HasMany => JoinKind::Left,
        }
    }
}

/// SQL join flavour used when attaching an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
    Right,
}

impl From<JoinKind> for sea_query::JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Left => sea_query::JoinType::LeftJoin,
            JoinKind::Inner => sea_query::JoinType::InnerJoin,
            JoinKind::Right => sea_query::JoinType::RightJoin,
        }
    }
}

/// Options recognised when declaring an association
///
/// # Example
///
/// ```
/// use tether::{AssociationOptions, JoinKind, Predicate};
///
/// let options = AssociationOptions::new()
///     .foreign_key("organization_id")
///     .join_type(JoinKind::Inner)
///     .condition(Predicate::eq("active", true))
///     .property("organization");
/// ```
#[derive(Debug, Clone, Default)]
pub struct AssociationOptions {
    class_name: Option<String>,
    foreign_key: Option<String>,
    conditions: Vec<Predicate>,
    dependent: bool,
    target: Option<String>,
    join_type: Option<JoinKind>,
    property: Option<String>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered collection the target is built from; defaults to the association name
    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Replace the static conditions
    pub fn conditions(mut self, conditions: Vec<Predicate>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Add one static condition
    pub fn condition(mut self, predicate: Predicate) -> Self {
        self.conditions.push(predicate);
        self
    }

    pub fn dependent(mut self, dependent: bool) -> Self {
        self.dependent = dependent;
        self
    }

    /// Alias of the target collection; defaults to the association name
    pub fn target(mut self, alias: impl Into<String>) -> Self {
        self.target = Some(alias.into());
        self
    }

    pub fn join_type(mut self, kind: JoinKind) -> Self {
        self.join_type = Some(kind);
        self
    }

    /// Record key the associated data is stored under; defaults to the association name
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.property = Some(name.into());
        self
    }
}

/// A relationship between two collections
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    name: String,
    rel_type: RelationType,
    source: String,
    target: Option<String>,
    class_name: String,
    foreign_key: Option<String>,
    conditions: Vec<Predicate>,
    dependent: bool,
    join_type: JoinKind,
    property: String,
}

impl Association {
    /// Create an association named `name` declared on the collection aliased `source`
    pub fn new(
        name: &str,
        rel_type: RelationType,
        source: &str,
        options: AssociationOptions,
    ) -> Self {
        let AssociationOptions {
            class_name,
            foreign_key,
            conditions,
            dependent,
            target,
            join_type,
            property,
        } = options;

        Self {
            name: name.to_string(),
            rel_type,
            source: source.to_string(),
            target,
            class_name: class_name
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| name.to_string()),
            foreign_key,
            conditions,
            dependent,
            join_type: join_type.unwrap_or_else(|| rel_type.default_join_type()),
            property: property
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rel_type(&self) -> RelationType {
        self.rel_type
    }

    /// Alias of the collection this association is declared on
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn set_source(&mut self, alias: &str) {
        self.source = alias.to_string();
    }

    /// Alias the target collection is registered under
    pub fn target_alias(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Configured foreign key, or the conventional one for this kind:
    /// `<target>_id` on the source for belongs-to, `<source>_id` on the
    /// target otherwise.
    pub fn foreign_key(&self) -> String {
        match &self.foreign_key {
            Some(fk) => fk.clone(),
            None => match self.rel_type {
                RelationType::BelongsTo => format!("{}_id", singular_snake(self.target_alias())),
                RelationType::HasOne | RelationType::HasMany => {
                    format!("{}_id", singular_snake(&self.source))
                }
            },
        }
    }

    pub fn set_foreign_key(&mut self, column: impl Into<String>) {
        self.foreign_key = Some(column.into());
    }

    pub fn conditions(&self) -> &[Predicate] {
        &self.conditions
    }

    pub fn set_conditions(&mut self, conditions: Vec<Predicate>) {
        self.conditions = conditions;
    }

    pub fn dependent(&self) -> bool {
        self.dependent
    }

    pub fn set_dependent(&mut self, dependent: bool) {
        self.dependent = dependent;
    }

    pub fn join_type(&self) -> JoinKind {
        self.join_type
    }

    pub fn set_join_type(&mut self, kind: JoinKind) {
        self.join_type = kind;
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn set_property(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !name.is_empty() {
            self.property = name;
        }
    }

    /// Whether this association can be expressed as a join on the parent statement
    pub fn can_be_joined(&self) -> bool {
        match self.rel_type {
            RelationType::HasOne | RelationType::BelongsTo => true,
            RelationType::HasMany => false,
        }
    }

    /// Whether one parent record relates to many target records
    pub fn is_many(&self) -> bool {
        self.rel_type == RelationType::HasMany
    }

    /// Resolve the target collection, registering it on first use
    pub fn target(&self, registry: &Registry) -> Rc<Collection> {
        registry.build(
            self.target_alias(),
            crate::collection::CollectionOptions::new().class_name(&self.class_name),
        )
    }

    /// Columns linking the two sides for the given foreign key, as
    /// `(source column, target column)`
    pub fn binding_keys(
        &self,
        source: &Collection,
        target: &Collection,
        foreign_key: &str,
    ) -> (String, String) {
        match self.rel_type {
            RelationType::BelongsTo => (foreign_key.to_string(), target.primary_key().to_string()),
            RelationType::HasOne | RelationType::HasMany => {
                (source.primary_key().to_string(), foreign_key.to_string())
            }
        }
    }

    /// Alter a compiled query to join this association's target.
    ///
    /// The join condition is the key equality followed by the static
    /// conditions and the containment's override conditions. Fields are added
    /// when the containment lists them explicitly, or when `include_fields` is
    /// set and the containment does not opt out.
    pub fn attach_to(&self, query: &mut CompiledQuery, node: &ContainNode, include_fields: bool) {
        let alias = node.alias.as_str();
        let source_alias = node.source_alias.as_str();
        let foreign_key = node
            .config
            .foreign_key
            .clone()
            .unwrap_or_else(|| self.foreign_key());
        let (source_col, target_col) = self.binding_keys(&node.source, &node.target, &foreign_key);

        let key_equality = match self.rel_type {
            RelationType::BelongsTo => Predicate::columns(
                qualify(&target_col, alias),
                qualify(&source_col, source_alias),
            ),
            RelationType::HasOne | RelationType::HasMany => Predicate::columns(
                qualify(&source_col, source_alias),
                qualify(&target_col, alias),
            ),
        };

        let mut on = vec![key_equality];
        on.extend(self.conditions.iter().map(|p| p.qualify(alias)));
        on.extend(node.config.conditions.iter().map(|p| p.qualify(alias)));

        log::debug!(
            "joining {} as {alias} ({:?}) onto {source_alias}",
            node.target.table(),
            self.join_type
        );
        query.add_join(JoinClause {
            alias: alias.to_string(),
            table: node.target.table().to_string(),
            kind: self.join_type,
            on,
        });

        let columns: Vec<String> = match &node.config.fields {
            Fields::Only(columns) => columns.clone(),
            Fields::Default if include_fields => {
                node.target.column_names().map(str::to_string).collect()
            }
            Fields::Default | Fields::Nothing => Vec::new(),
        };
        query.add_fields(columns.iter().map(|c| {
            let (key, expr) = alias_field(c, alias);
            Field::aliased(key, expr)
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionOptions;

    #[test]
    fn test_defaults_from_name() {
        let assoc = Association::new("client", RelationType::BelongsTo, "foo", AssociationOptions::new());
        assert_eq!(assoc.class_name(), "client");
        assert_eq!(assoc.property(), "client");
        assert_eq!(assoc.target_alias(), "client");
        assert_eq!(assoc.join_type(), JoinKind::Left);
        assert!(!assoc.dependent());
        assert!(assoc.conditions().is_empty());
    }

    #[test]
    fn test_empty_property_falls_back_to_name() {
        let mut assoc = Association::new(
            "article",
            RelationType::HasMany,
            "author",
            AssociationOptions::new().property(""),
        );
        assert_eq!(assoc.property(), "article");
        assert!(assoc.is_many());
        assoc.set_property("");
        assert_eq!(assoc.property(), "article");
        assoc.set_property("articles");
        assert_eq!(assoc.property(), "articles");
    }

    #[test]
    fn test_can_be_joined_by_kind() {
        let opts = AssociationOptions::new;
        assert!(Association::new("a", RelationType::BelongsTo, "s", opts()).can_be_joined());
        assert!(Association::new("a", RelationType::HasOne, "s", opts()).can_be_joined());
        assert!(!Association::new("a", RelationType::HasMany, "s", opts()).can_be_joined());
    }

    #[test]
    fn test_default_foreign_keys() {
        let belongs = Association::new("orderType", RelationType::BelongsTo, "order", AssociationOptions::new());
        assert_eq!(belongs.foreign_key(), "order_type_id");

        let has_one = Association::new("order", RelationType::HasOne, "client", AssociationOptions::new());
        assert_eq!(has_one.foreign_key(), "client_id");
        assert_eq!(has_one.join_type(), JoinKind::Inner);

        let mut has_many = Association::new("article", RelationType::HasMany, "author", AssociationOptions::new());
        assert_eq!(has_many.foreign_key(), "author_id");
        has_many.set_foreign_key("writer_id");
        assert_eq!(has_many.foreign_key(), "writer_id");
    }

    #[test]
    fn test_target_is_resolved_lazily_and_cached() {
        let registry = Registry::new();
        let assoc = Association::new("widget", RelationType::HasOne, "order", AssociationOptions::new());
        assert!(registry.get("widget").is_none());

        let first = assoc.target(&registry);
        let second = assoc.target(&registry);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.table(), "widgets");
    }

    #[test]
    fn test_target_uses_explicit_collection() {
        let registry = Registry::new();
        registry.build("stuff", CollectionOptions::new().table("things"));
        let assoc = Association::new("stuff", RelationType::HasOne, "order", AssociationOptions::new());
        assert_eq!(assoc.target(&registry).table(), "things");

        let aliased = Association::new(
            "editor",
            RelationType::BelongsTo,
            "article",
            AssociationOptions::new().class_name("stuff"),
        );
        let target = aliased.target(&registry);
        assert_eq!(target.alias(), "editor");
        assert_eq!(target.table(), "things");
    }

    #[test]
    fn test_binding_keys() {
        let registry = Registry::new();
        let author = registry.build("author", CollectionOptions::new());
        let article = registry.build("article", CollectionOptions::new().primary_key("article_id"));

        let has_many = Association::new("article", RelationType::HasMany, "author", AssociationOptions::new());
        assert_eq!(
            has_many.binding_keys(&author, &article, "author_id"),
            ("id".to_string(), "author_id".to_string())
        );

        let belongs = Association::new("author", RelationType::BelongsTo, "article", AssociationOptions::new());
        assert_eq!(
            belongs.binding_keys(&article, &author, "author_id"),
            ("author_id".to_string(), "id".to_string())
        );
    }
}
