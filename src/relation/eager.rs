//! Eager loading of associations that cannot be joined.
//!
//! This module loads associated rows for a whole batch of parent rows in one
//! follow-up statement, the "selectinload" strategy:
//! 1. Collect the parent key values from the fetched parent rows
//! 2. Select the target rows whose key is `IN` those values, applying the
//!    association's conditions and the containment's options
//! 3. Group the target rows by key
//! 4. Merge each group into its parent row under the association's property
//!
//! Containments nested below the loaded association are handled by the
//! follow-up query itself, so deeper levels join or defer the same way.

use crate::collection::Registry;
use crate::executor::{LifeError, LifeExecutor, Record};
use crate::query::contain::Fields;
use crate::query::planner::Deferred;
use crate::query::predicate::{qualify, Predicate};
use crate::query::result::{navigate_mut, Stage};
use crate::query::select::Query;
use crate::query::value_conversion::{group_key, json_to_value};
use crate::relation::def::Association;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Stage that merges loaded rows into a parent row
pub type MergeFn = Stage;

impl Association {
    /// Load this association for a batch of parent keys and return the stage
    /// that merges the loaded rows into each parent row.
    ///
    /// No statement runs when `parent_keys` is empty.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::MissingKeyField` when the loaded rows lack the key
    /// column, and any error from running the follow-up statement.
    pub fn eager_loader<E>(
        &self,
        registry: &Registry,
        executor: &E,
        parent_keys: &[JsonValue],
        deferred: &Deferred,
    ) -> Result<MergeFn, LifeError>
    where
        E: LifeExecutor + ?Sized,
    {
        let node = &deferred.node;

        let mut seen = HashSet::new();
        let keys: Vec<JsonValue> = parent_keys
            .iter()
            .filter(|k| seen.insert(group_key(k)))
            .cloned()
            .collect();

        let groups = if keys.is_empty() {
            log::trace!("no parent keys for {}, skipping load", node.alias);
            HashMap::new()
        } else {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::eager_load_span(&node.alias, keys.len()).entered();

            let mut query = Query::new()
                .repository(node.target.alias())
                .aliased(&node.alias);
            if let Fields::Only(fields) = &node.config.fields {
                query = query.select(fields.iter().cloned());
            }
            query = query.filter(Predicate::In(
                qualify(&deferred.child_key, &node.alias),
                keys.iter().filter_map(json_to_value).collect(),
            ));
            for predicate in self.conditions().iter().chain(&node.config.conditions) {
                query = query.filter(predicate.clone());
            }
            for (column, order) in &node.config.sort {
                query = query.order_by(column.clone(), *order);
            }

            #[cfg(feature = "metrics")]
            METRICS.record_eager_query();

            let rows = query.execute_nodes(registry, executor, &node.children)?.to_vec()?;
            log::debug!("loaded {} {} rows for {} keys", rows.len(), node.alias, keys.len());
            group_rows(rows, &deferred.child_key, &node.alias)?
        };

        let many = self.is_many();
        let property = self.property().to_string();
        let parent_path = deferred.parent_path.clone();
        let parent_key = deferred.parent_key.clone();

        Ok(Box::new(move |mut row: Record| {
            if let Some(parent) = navigate_mut(&mut row, &parent_path) {
                let matched = parent
                    .get(&parent_key)
                    .filter(|v| !v.is_null())
                    .and_then(|key| groups.get(&group_key(key)));
                match matched {
                    Some(children) if many => {
                        let list = children.iter().cloned().map(JsonValue::Object).collect();
                        parent.insert(property.clone(), JsonValue::Array(list));
                    }
                    Some(children) => {
                        let first = children.first().cloned().map_or(JsonValue::Null, JsonValue::Object);
                        parent.insert(property.clone(), first);
                    }
                    None if !many => {
                        parent.insert(property.clone(), JsonValue::Null);
                    }
                    None => {}
                }
            }
            row
        }))
    }
}

/// Group loaded rows by their key column, keeping fetch order within a group
fn group_rows(
    rows: Vec<Record>,
    key_column: &str,
    alias: &str,
) -> Result<HashMap<String, Vec<Record>>, LifeError> {
    let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
    for row in rows {
        let key = match row.get(key_column) {
            Some(JsonValue::Null) => continue,
            Some(value) => group_key(value),
            None => {
                return Err(LifeError::MissingKeyField {
                    field: format!("{alias}.{key_column}"),
                })
            }
        };
        groups.entry(key).or_default().push(row);
    }
    Ok(groups)
}
