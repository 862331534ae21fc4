//! Normalization of containment specs against the association graph.
//!
//! Every entry of a spec is resolved to the association it names on its
//! parent collection, and the association's target collection is resolved
//! through the registry. The result is a tree of [`ContainNode`]s carrying
//! everything the planner and the eager loader need.

use crate::collection::{Collection, Registry};
use crate::executor::LifeError;
use crate::query::contain::{Contain, Fields, SortOrder, Strategy};
use crate::query::predicate::Predicate;
use crate::relation::Association;
use std::rc::Rc;

/// Effective options of one containment after normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeConfig {
    pub fields: Fields,
    pub conditions: Vec<Predicate>,
    pub sort: Vec<(String, SortOrder)>,
    pub foreign_key: Option<String>,
    pub strategy: Strategy,
}

/// A resolved containment
#[derive(Debug, Clone)]
pub struct ContainNode {
    /// Association name; also the SQL alias the target is joined or selected under
    pub alias: String,
    /// SQL alias of the parent this node hangs off
    pub source_alias: String,
    pub association: Association,
    pub source: Rc<Collection>,
    pub target: Rc<Collection>,
    pub config: NodeConfig,
    pub children: Vec<ContainNode>,
}

impl ContainNode {
    /// Whether this node is attached as a join rather than loaded separately
    pub fn is_joinable(&self) -> bool {
        self.association.can_be_joined() && self.config.strategy == Strategy::Join
    }

    /// Foreign key in effect for this load
    pub fn foreign_key(&self) -> String {
        self.config
            .foreign_key
            .clone()
            .unwrap_or_else(|| self.association.foreign_key())
    }

    /// Columns linking parent and target rows, as `(parent column, target column)`
    pub fn binding_keys(&self) -> (String, String) {
        self.association
            .binding_keys(&self.source, &self.target, &self.foreign_key())
    }

    pub fn property(&self) -> &str {
        self.association.property()
    }

    /// Whether an explicit field list for the target would leave out `column`
    pub fn excludes_field(&self, column: &str) -> bool {
        match &self.config.fields {
            Fields::Default => false,
            Fields::Nothing => true,
            Fields::Only(fields) => !fields.iter().any(|f| {
                f == column || f.split_once('.') == Some((self.alias.as_str(), column))
            }),
        }
    }
}

/// Resolve a list of containments declared under `parent`
pub fn normalize(
    registry: &Registry,
    parent: &Rc<Collection>,
    parent_alias: &str,
    containments: &[Contain],
) -> Result<Vec<ContainNode>, LifeError> {
    containments
        .iter()
        .map(|contain| normalize_one(registry, parent, parent_alias, contain))
        .collect()
}

fn normalize_one(
    registry: &Registry,
    parent: &Rc<Collection>,
    parent_alias: &str,
    contain: &Contain,
) -> Result<ContainNode, LifeError> {
    let association = parent
        .association(&contain.name)
        .cloned()
        .ok_or_else(|| LifeError::UnknownAssociation {
            source: parent.alias().to_string(),
            name: contain.name.clone(),
        })?;
    let target = association.target(registry);
    let options = &contain.options;

    let config = NodeConfig {
        fields: options.fields.clone().unwrap_or_default(),
        conditions: options.conditions.clone().unwrap_or_default(),
        sort: options.sort.clone().unwrap_or_default(),
        foreign_key: options.foreign_key.clone(),
        strategy: options.strategy.unwrap_or_default(),
    };

    if config.strategy == Strategy::Join && !association.can_be_joined() {
        log::trace!(
            "{} cannot be joined onto {parent_alias}, loading separately",
            contain.name
        );
    }

    let children = normalize(registry, &target, &contain.name, &options.associations)?;

    Ok(ContainNode {
        alias: contain.name.clone(),
        source_alias: parent_alias.to_string(),
        association,
        source: Rc::clone(parent),
        target,
        config,
        children,
    })
}
