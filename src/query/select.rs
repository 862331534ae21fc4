//! Select query builder with containment support.
//!
//! This module provides [`Query`], a builder over a registered collection.
//! Query building methods (select, filter, order_by, contain, etc.) are
//! defined here, while execution methods are in the execution module.

use crate::collection::Registry;
use crate::executor::{Backend, LifeError};
use crate::query::contain::{merge_contain, Contain, IntoContain, SortOrder};
use crate::query::normalize::{normalize, ContainNode};
use crate::query::planner::CompiledQuery;
use crate::query::predicate::{qualify, Predicate};
use serde_json::Value as JsonValue;

/// One entry of a select list: an expression and the key it is fetched under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub alias: Option<String>,
    pub expr: String,
}

impl Field {
    /// Unaliased field; qualified and aliased when the query compiles
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            alias: None,
            expr: expr.into(),
        }
    }

    pub fn aliased(alias: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            expr: expr.into(),
        }
    }
}

/// Select-list key and qualified expression for a field of the collection
/// aliased `alias`. Qualified fields keep their own alias.
///
/// ```
/// use tether::query::alias_field;
///
/// assert_eq!(alias_field("id", "foo"), ("foo__id".to_string(), "foo.id".to_string()));
/// assert_eq!(alias_field("client.name", "foo"), ("client__name".to_string(), "client.name".to_string()));
/// ```
pub fn alias_field(field: &str, alias: &str) -> (String, String) {
    let (alias, column) = field.split_once('.').unwrap_or((alias, field));
    (format!("{alias}__{column}"), format!("{alias}.{column}"))
}

/// Alias every unaliased field in `fields` against `alias`
pub fn alias_fields(fields: &[Field], alias: &str) -> Vec<Field> {
    fields
        .iter()
        .map(|field| match &field.alias {
            Some(_) => field.clone(),
            None => {
                let (key, expr) = alias_field(&field.expr, alias);
                Field::aliased(key, expr)
            }
        })
        .collect()
}

/// Query builder for selecting records of a registered collection
///
/// # Example
///
/// ```
/// use tether::{CollectionOptions, AssociationOptions, Query, Registry, SortOrder};
///
/// let registry = Registry::new();
/// registry.build("article", CollectionOptions::new());
/// registry.build("author", CollectionOptions::new());
/// registry.belongs_to("article", "author", AssociationOptions::new()).unwrap();
///
/// let query = Query::new()
///     .repository("article")
///     .select(["id", "title", "author_id"])
///     .where_eq("published", true)
///     .order_by("id", SortOrder::Desc)
///     .contain("author");
/// let compiled = query.compile(&registry).unwrap();
/// assert_eq!(compiled.join_clause().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    repository: Option<String>,
    alias: Option<String>,
    fields: Vec<Field>,
    containments: Vec<Contain>,
    conditions: Vec<Predicate>,
    order: Vec<(String, SortOrder)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the query to the collection registered under `alias`
    pub fn repository(mut self, alias: impl Into<String>) -> Self {
        self.repository = Some(alias.into());
        self
    }

    pub fn repository_alias(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// Query the repository under a different SQL alias
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// SQL alias of the root collection
    ///
    /// # Errors
    ///
    /// Returns `LifeError::MissingRepository` if no repository is bound.
    pub fn root_alias(&self) -> Result<&str, LifeError> {
        self.alias
            .as_deref()
            .or(self.repository.as_deref())
            .ok_or(LifeError::MissingRepository)
    }

    /// Append fields to the select list. Without any, every schema column of
    /// the repository and of joined containments is selected.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Field::new));
        self
    }

    /// Append an expression fetched under an explicit key
    pub fn select_as(mut self, alias: impl Into<String>, expr: impl Into<String>) -> Self {
        self.fields.push(Field::aliased(alias, expr));
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.conditions.push(predicate);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<sea_query::Value>) -> Self {
        self.filter(Predicate::eq(column, value))
    }

    pub fn conditions(&self) -> &[Predicate] {
        &self.conditions
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Add associations to load with the query. Repeated calls merge into
    /// the existing containments.
    pub fn contain(mut self, spec: impl IntoContain) -> Self {
        for entry in spec.into_contain() {
            merge_contain(&mut self.containments, entry);
        }
        self
    }

    /// Like [`Query::contain`] with a spec in its JSON form
    ///
    /// # Errors
    ///
    /// Returns `LifeError::InvalidContain` if the spec has an unexpected shape.
    pub fn contain_json(self, spec: &JsonValue) -> Result<Self, LifeError> {
        Ok(self.contain(Contain::from_json(spec)?))
    }

    pub fn containments(&self) -> &[Contain] {
        &self.containments
    }

    /// Drop every containment
    pub fn clear_containments(mut self) -> Self {
        self.containments.clear();
        self
    }

    /// Select-list key and qualified expression for `field`, defaulting to
    /// the repository's alias
    ///
    /// # Errors
    ///
    /// Returns `LifeError::MissingRepository` if no alias is given and no
    /// repository is bound.
    pub fn alias_field(&self, field: &str, alias: Option<&str>) -> Result<(String, String), LifeError> {
        let alias = match alias {
            Some(alias) => alias,
            None => self.root_alias()?,
        };
        Ok(alias_field(field, alias))
    }

    /// Resolve the containments against the association graph
    ///
    /// # Errors
    ///
    /// Returns `LifeError::UnknownAssociation` for a name that is not declared
    /// on its parent collection.
    pub fn normalized_containments(&self, registry: &Registry) -> Result<Vec<ContainNode>, LifeError> {
        let repository = self.repository.as_deref().ok_or(LifeError::MissingRepository)?;
        let root = registry.collection(repository)?;
        normalize(registry, &root, self.root_alias()?, &self.containments)
    }

    /// Resolve containments into joins and deferred loads
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the repository or an association is
    /// unknown, or if a key needed by a deferred load is not selected.
    pub fn compile(&self, registry: &Registry) -> Result<CompiledQuery, LifeError> {
        let nodes = self.normalized_containments(registry)?;
        self.compile_nodes(registry, &nodes)
    }

    pub(crate) fn compile_nodes(
        &self,
        registry: &Registry,
        nodes: &[ContainNode],
    ) -> Result<CompiledQuery, LifeError> {
        let repository = self.repository.as_deref().ok_or(LifeError::MissingRepository)?;
        let root = registry.collection(repository)?;
        let alias = self.root_alias()?;

        let has_fields = !self.fields.is_empty();
        // `SELECT *` returns unaliased columns, so parent keys and joined
        // rows could not be told apart
        if !has_fields && root.schema().is_empty() && !nodes.is_empty() {
            return Err(LifeError::MissingSchema(alias.to_string()));
        }
        let select = if has_fields {
            alias_fields(&self.fields, alias)
        } else {
            let defaults: Vec<Field> = root.column_names().map(Field::new).collect();
            alias_fields(&defaults, alias)
        };

        let mut compiled = CompiledQuery::new(root, alias, select);
        compiled.conditions = self.conditions.iter().map(|p| p.qualify(alias)).collect();
        compiled.order = self
            .order
            .iter()
            .map(|(column, order)| (qualify(column, alias), *order))
            .collect();
        compiled.limit = self.limit;
        compiled.offset = self.offset;

        compiled.plan(nodes, !has_fields)?;
        compiled.check_key_fields()?;

        log::trace!(
            "compiled {alias}: {} joins, {} deferred",
            compiled.join_clause().len(),
            compiled.deferred().len()
        );
        Ok(compiled)
    }

    /// Render the main statement for `backend` with values inlined
    pub fn sql(&self, registry: &Registry, backend: Backend) -> Result<String, LifeError> {
        Ok(self.compile(registry)?.to_sql(backend))
    }
}
