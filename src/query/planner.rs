//! Join planning.
//!
//! Walks a normalized containment tree depth-first in declaration order.
//! Joinable associations whose whole parent chain is joined are attached to
//! the statement; every other association becomes a [`Deferred`] load that is
//! fetched after the main statement runs.

use crate::collection::{Collection, ColumnType};
use crate::executor::{Backend, LifeError};
use crate::query::contain::SortOrder;
use crate::query::normalize::ContainNode;
use crate::query::predicate::{all_of, column_expr, column_ref, Predicate};
use crate::query::select::Field;
use crate::relation::JoinKind;
use sea_query::{Alias, Asterisk, Expr, Query as SqlQuery, SelectStatement};
use std::rc::Rc;

/// A join attached to a statement
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub alias: String,
    pub table: String,
    pub kind: JoinKind,
    /// Conjunctive join condition
    pub on: Vec<Predicate>,
}

/// Where rows of a joined collection land in the hydrated record
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub alias: String,
    /// Property path from the root record; empty for the root collection
    pub path: Vec<String>,
    pub collection: Rc<Collection>,
}

/// An association loaded by a follow-up statement
#[derive(Debug, Clone)]
pub struct Deferred {
    pub node: ContainNode,
    /// SQL alias of the parent in the main statement
    pub parent_alias: String,
    /// Property path of the parent within a hydrated record
    pub parent_path: Vec<String>,
    /// Parent column holding the key
    pub parent_key: String,
    /// Target column matched against the parent keys
    pub child_key: String,
}

impl Deferred {
    /// Select-list key the parent key is fetched under
    pub fn parent_field(&self) -> String {
        format!("{}__{}", self.parent_alias, self.parent_key)
    }
}

/// A query with its containments resolved into joins and deferred loads
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub(crate) root: Rc<Collection>,
    pub(crate) alias: String,
    pub(crate) select: Vec<Field>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) conditions: Vec<Predicate>,
    pub(crate) order: Vec<(String, SortOrder)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) aliases: Vec<AliasEntry>,
    pub(crate) deferred: Vec<Deferred>,
}

impl CompiledQuery {
    pub(crate) fn new(root: Rc<Collection>, alias: &str, select: Vec<Field>) -> Self {
        let aliases = vec![AliasEntry {
            alias: alias.to_string(),
            path: Vec::new(),
            collection: Rc::clone(&root),
        }];
        Self {
            root,
            alias: alias.to_string(),
            select,
            joins: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            aliases,
            deferred: Vec::new(),
        }
    }

    /// Alias of the root collection
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn select_clause(&self) -> &[Field] {
        &self.select
    }

    pub fn join_clause(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn deferred(&self) -> &[Deferred] {
        &self.deferred
    }

    /// Joined aliases and where their columns land, root first
    pub fn alias_map(&self) -> &[AliasEntry] {
        &self.aliases
    }

    pub fn needs_eager_loading(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn add_join(&mut self, join: JoinClause) {
        self.joins.push(join);
    }

    pub fn add_fields(&mut self, fields: impl IntoIterator<Item = Field>) {
        self.select.extend(fields);
    }

    /// Build the sea-query statement
    pub fn statement(&self) -> SelectStatement {
        let mut statement = SqlQuery::select();
        statement.from_as(Alias::new(self.root.table()), Alias::new(&self.alias));

        if self.select.is_empty() {
            statement.column(Asterisk);
        }
        for field in &self.select {
            let expr = field_expr(&field.expr);
            match &field.alias {
                Some(alias) => statement.expr_as(expr, Alias::new(alias)),
                None => statement.expr(expr),
            };
        }

        for join in &self.joins {
            statement.join_as(
                join.kind.into(),
                Alias::new(&join.table),
                Alias::new(&join.alias),
                all_of(&self.typed(&join.on)),
            );
        }

        if !self.conditions.is_empty() {
            statement.cond_where(all_of(&self.typed(&self.conditions)));
        }
        for (column, order) in &self.order {
            statement.order_by(column_ref(column), (*order).into());
        }
        if let Some(limit) = self.limit {
            statement.limit(limit);
        }
        if let Some(offset) = self.offset {
            statement.offset(offset);
        }
        statement
    }

    /// SQL with values inlined, for logging and inspection
    pub fn to_sql(&self, backend: Backend) -> String {
        backend.render(&self.statement())
    }

    /// Attach joinable containments and record the deferred ones
    ///
    /// # Errors
    ///
    /// Returns `LifeError::InvalidContain` when two joined containments
    /// would share one SQL alias.
    pub(crate) fn plan(&mut self, nodes: &[ContainNode], include_fields: bool) -> Result<(), LifeError> {
        let (joined, deferred) = placements(nodes);

        for (node, parent_path) in joined {
            if self.aliases.iter().any(|entry| entry.alias == node.alias) {
                return Err(LifeError::InvalidContain(format!(
                    "\"{}\" is joined more than once; the same association cannot be joined on two branches",
                    node.alias
                )));
            }
            node.association.attach_to(self, node, include_fields);
            let mut path = parent_path;
            path.push(node.property().to_string());
            self.aliases.push(AliasEntry {
                alias: node.alias.clone(),
                path,
                collection: Rc::clone(&node.target),
            });
        }

        for (node, parent_path) in deferred {
            let (parent_key, child_key) = node.binding_keys();
            self.deferred.push(Deferred {
                node: node.clone(),
                parent_alias: node.source_alias.clone(),
                parent_path,
                parent_key,
                child_key,
            });
        }
        Ok(())
    }

    /// Schema type of a qualified column of the root or a joined collection
    fn column_type(&self, column: &str) -> Option<ColumnType> {
        let (alias, name) = column.split_once('.')?;
        self.aliases
            .iter()
            .find(|entry| entry.alias == alias)?
            .collection
            .column(name)
            .map(|c| c.column_type)
    }

    /// Bound values typed after the columns they are compared with
    fn typed(&self, predicates: &[Predicate]) -> Vec<Predicate> {
        predicates
            .iter()
            .map(|p| p.coerce(|column| self.column_type(column)))
            .collect()
    }

    /// Fail before anything runs when a key needed to stitch deferred rows
    /// together is not going to be fetched
    pub(crate) fn check_key_fields(&self) -> Result<(), LifeError> {
        let selects_all = self.select.is_empty();
        for deferred in &self.deferred {
            let field = deferred.parent_field();
            let selected = self
                .select
                .iter()
                .any(|f| f.alias.as_deref() == Some(field.as_str()));
            if !selected && !selects_all {
                return Err(LifeError::MissingKeyField {
                    field: format!("{}.{}", deferred.parent_alias, deferred.parent_key),
                });
            }
            if deferred.node.excludes_field(&deferred.child_key) {
                return Err(LifeError::MissingKeyField {
                    field: format!("{}.{}", deferred.node.alias, deferred.child_key),
                });
            }
            check_subtree(&deferred.node)?;
        }
        Ok(())
    }
}

/// Key field checks for loads nested below a deferred node
fn check_subtree(parent: &ContainNode) -> Result<(), LifeError> {
    for child in &parent.children {
        if !child.is_joinable() {
            let (parent_key, child_key) = child.binding_keys();
            if parent.excludes_field(&parent_key) {
                return Err(LifeError::MissingKeyField {
                    field: format!("{}.{parent_key}", parent.alias),
                });
            }
            if child.excludes_field(&child_key) {
                return Err(LifeError::MissingKeyField {
                    field: format!("{}.{child_key}", child.alias),
                });
            }
        }
        check_subtree(child)?;
    }
    Ok(())
}

/// A containment and the property path of the record it hangs off
type Placement<'a> = (&'a ContainNode, Vec<String>);

/// Split a containment tree into joined nodes and deferred loads, both
/// depth-first in declaration order. Descent stops at the first node that is
/// not joined; its subtree runs inside its own follow-up statement.
fn placements(nodes: &[ContainNode]) -> (Vec<Placement<'_>>, Vec<Placement<'_>>) {
    let mut joined = Vec::new();
    let mut deferred = Vec::new();
    place(nodes, &[], &mut joined, &mut deferred);
    (joined, deferred)
}

fn place<'a>(
    nodes: &'a [ContainNode],
    parent_path: &[String],
    joined: &mut Vec<Placement<'a>>,
    deferred: &mut Vec<Placement<'a>>,
) {
    for node in nodes {
        if node.is_joinable() {
            joined.push((node, parent_path.to_vec()));
            let mut path = parent_path.to_vec();
            path.push(node.property().to_string());
            place(&node.children, &path, joined, deferred);
        } else {
            deferred.push((node, parent_path.to_vec()));
        }
    }
}

/// Containments that will be joined onto the statement, depth-first in
/// declaration order. Stops descending at the first non-joinable node.
pub fn resolve_first_level(nodes: &[ContainNode]) -> Vec<&ContainNode> {
    placements(nodes).0.into_iter().map(|(node, _)| node).collect()
}

fn is_identifier(expr: &str) -> bool {
    let mut parts = expr.split('.');
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(col), None, None) => valid(col),
        (Some(table), Some(col), None) => valid(table) && valid(col),
        _ => false,
    }
}

fn field_expr(expr: &str) -> Expr {
    if is_identifier(expr) {
        column_expr(expr)
    } else {
        Expr::cust(expr.to_string())
    }
}
