//! Containment specs: which associations to load alongside a query.
//!
//! A containment is an association name with optional per-load options and
//! nested containments of its own. Specs can be built with the typed API or
//! parsed from JSON:
//!
//! ```
//! use serde_json::json;
//! use tether::{Contain, ContainOptions, SortOrder};
//!
//! let typed = Contain::with(
//!     "article",
//!     ContainOptions::new()
//!         .fields(["title", "author_id"])
//!         .sort("id", SortOrder::Desc)
//!         .contain("comment"),
//! );
//!
//! let parsed = Contain::from_json(&json!({
//!     "article": {"fields": ["title", "author_id"], "sort": {"id": "DESC"}, "comment": []}
//! }))
//! .unwrap();
//! assert_eq!(parsed, vec![typed]);
//! ```

use crate::executor::LifeError;
use crate::query::predicate::Predicate;
use crate::query::value_conversion::json_to_value;
use serde_json::Value as JsonValue;

/// Which columns of an associated collection to fetch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Fields {
    /// Every schema column, when the enclosing query selects its defaults
    #[default]
    Default,
    /// Exactly these columns
    Only(Vec<String>),
    /// No columns
    Nothing,
}

/// How a containment is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Join onto the parent statement when the association allows it
    #[default]
    Join,
    /// Always issue a follow-up statement
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl From<SortOrder> for sea_query::Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => sea_query::Order::Asc,
            SortOrder::Desc => sea_query::Order::Desc,
        }
    }
}

/// Per-load options of a containment. Unset options fall back to the
/// association's configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainOptions {
    pub fields: Option<Fields>,
    pub conditions: Option<Vec<Predicate>>,
    pub sort: Option<Vec<(String, SortOrder)>>,
    pub foreign_key: Option<String>,
    pub strategy: Option<Strategy>,
    pub associations: Vec<Contain>,
}

impl ContainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch only these columns of the associated collection
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.fields = Some(if fields.is_empty() {
            Fields::Default
        } else {
            Fields::Only(fields)
        });
        self
    }

    /// Fetch none of the associated collection's columns
    pub fn no_fields(mut self) -> Self {
        self.fields = Some(Fields::Nothing);
        self
    }

    /// Add a filter applied on top of the association's own conditions
    pub fn condition(mut self, predicate: Predicate) -> Self {
        self.conditions.get_or_insert_with(Vec::new).push(predicate);
        self
    }

    pub fn conditions(mut self, conditions: Vec<Predicate>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort
            .get_or_insert_with(Vec::new)
            .push((column.into(), order));
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Nest containments below this one
    pub fn contain(mut self, spec: impl IntoContain) -> Self {
        for entry in spec.into_contain() {
            merge_contain(&mut self.associations, entry);
        }
        self
    }

    /// Overlay `other` onto these options: options set in `other` win and
    /// nested containments are merged by name.
    pub fn merge(&mut self, other: ContainOptions) {
        let ContainOptions {
            fields,
            conditions,
            sort,
            foreign_key,
            strategy,
            associations,
        } = other;

        if fields.is_some() {
            self.fields = fields;
        }
        if conditions.is_some() {
            self.conditions = conditions;
        }
        if sort.is_some() {
            self.sort = sort;
        }
        if foreign_key.is_some() {
            self.foreign_key = foreign_key;
        }
        if strategy.is_some() {
            self.strategy = strategy;
        }
        for entry in associations {
            merge_contain(&mut self.associations, entry);
        }
    }

    /// Parse options from their JSON form.
    ///
    /// Recognised keys are `associations`, `foreignKey`, `conditions`,
    /// `fields`, `sort` and `strategy`. Numeric keys hold nested entries and
    /// any other key names a nested association.
    pub fn from_json(value: &JsonValue) -> Result<Self, LifeError> {
        let mut options = ContainOptions::new();
        match value {
            JsonValue::Null | JsonValue::Bool(true) => {}
            JsonValue::String(_) | JsonValue::Array(_) => {
                options = options.contain(Contain::from_json(value)?);
            }
            JsonValue::Object(map) => {
                for (key, value) in map {
                    match key.as_str() {
                        "associations" => {
                            options = options.contain(Contain::from_json(value)?);
                        }
                        "foreignKey" => match value {
                            JsonValue::String(fk) => options.foreign_key = Some(fk.clone()),
                            other => return Err(invalid("foreignKey", other)),
                        },
                        "conditions" => options.conditions = Some(parse_conditions(value)?),
                        "fields" => options.fields = Some(parse_fields(value)?),
                        "sort" => options.sort = Some(parse_sort(value)?),
                        "strategy" => options.strategy = Some(parse_strategy(value)?),
                        numeric if numeric.parse::<usize>().is_ok() => {
                            options = options.contain(Contain::from_json(value)?);
                        }
                        name => {
                            options = options.contain(Contain::with(name, ContainOptions::from_json(value)?));
                        }
                    }
                }
            }
            other => return Err(invalid("containment options", other)),
        }
        Ok(options)
    }
}

/// One association to load, with its options
#[derive(Debug, Clone, PartialEq)]
pub struct Contain {
    pub name: String,
    pub options: ContainOptions,
}

impl Contain {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with(name, ContainOptions::new())
    }

    pub fn with(name: impl Into<String>, options: ContainOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Parse a list of containments from their JSON form.
    ///
    /// Accepts a name, a list of names and maps, or a map of name to options.
    /// Numeric map keys are treated as list positions.
    pub fn from_json(value: &JsonValue) -> Result<Vec<Contain>, LifeError> {
        let mut out = Vec::new();
        match value {
            JsonValue::String(name) if !name.is_empty() => out.push(Contain::new(name.clone())),
            JsonValue::Array(items) => {
                for item in items {
                    for entry in Contain::from_json(item)? {
                        merge_contain(&mut out, entry);
                    }
                }
            }
            JsonValue::Object(map) => {
                for (key, value) in map {
                    let entries = if key.parse::<usize>().is_ok() {
                        Contain::from_json(value)?
                    } else {
                        vec![Contain::with(key.clone(), ContainOptions::from_json(value)?)]
                    };
                    for entry in entries {
                        merge_contain(&mut out, entry);
                    }
                }
            }
            other => return Err(invalid("containment", other)),
        }
        Ok(out)
    }
}

impl From<&str> for Contain {
    fn from(name: &str) -> Self {
        Contain::new(name)
    }
}

/// Anything that can be turned into a list of containments
pub trait IntoContain {
    fn into_contain(self) -> Vec<Contain>;
}

impl IntoContain for Contain {
    fn into_contain(self) -> Vec<Contain> {
        vec![self]
    }
}

impl IntoContain for &str {
    fn into_contain(self) -> Vec<Contain> {
        vec![Contain::new(self)]
    }
}

impl IntoContain for String {
    fn into_contain(self) -> Vec<Contain> {
        vec![Contain::new(self)]
    }
}

impl<T: IntoContain> IntoContain for Vec<T> {
    fn into_contain(self) -> Vec<Contain> {
        self.into_iter().flat_map(IntoContain::into_contain).collect()
    }
}

impl<T: IntoContain, const N: usize> IntoContain for [T; N] {
    fn into_contain(self) -> Vec<Contain> {
        self.into_iter().flat_map(IntoContain::into_contain).collect()
    }
}

/// Add `entry` to `list`, merging it into an existing entry of the same name
pub fn merge_contain(list: &mut Vec<Contain>, entry: Contain) {
    match list.iter_mut().find(|c| c.name == entry.name) {
        Some(existing) => existing.options.merge(entry.options),
        None => list.push(entry),
    }
}

fn invalid(what: &str, value: &JsonValue) -> LifeError {
    LifeError::InvalidContain(format!("unexpected {what}: {value}"))
}

fn parse_fields(value: &JsonValue) -> Result<Fields, LifeError> {
    match value {
        JsonValue::Bool(false) => Ok(Fields::Nothing),
        JsonValue::Null | JsonValue::Bool(true) => Ok(Fields::Default),
        JsonValue::String(field) => Ok(Fields::Only(vec![field.clone()])),
        JsonValue::Array(items) if items.is_empty() => Ok(Fields::Default),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::String(field) => Ok(field.clone()),
                other => Err(invalid("field", other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Fields::Only),
        other => Err(invalid("fields", other)),
    }
}

fn parse_conditions(value: &JsonValue) -> Result<Vec<Predicate>, LifeError> {
    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::String(sql) => Ok(vec![Predicate::raw(sql.clone())]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::String(sql) => Ok(Predicate::raw(sql.clone())),
                other => Err(invalid("condition", other)),
            })
            .collect(),
        JsonValue::Object(map) => map
            .iter()
            .map(|(column, value)| match value {
                JsonValue::Null => Ok(Predicate::is_null(column.clone())),
                JsonValue::Array(items) => Ok(Predicate::In(
                    column.clone(),
                    items.iter().filter_map(json_to_value).collect(),
                )),
                scalar => json_to_value(scalar)
                    .map(|v| Predicate::Eq(column.clone(), v))
                    .ok_or_else(|| invalid("condition value", scalar)),
            })
            .collect(),
        other => Err(invalid("conditions", other)),
    }
}

fn parse_order(column: &str, order: &str) -> Result<(String, SortOrder), LifeError> {
    match order.to_ascii_uppercase().as_str() {
        "ASC" => Ok((column.to_string(), SortOrder::Asc)),
        "DESC" => Ok((column.to_string(), SortOrder::Desc)),
        _ => Err(LifeError::InvalidContain(format!(
            "unexpected sort direction for {column}: {order}"
        ))),
    }
}

fn parse_sort(value: &JsonValue) -> Result<Vec<(String, SortOrder)>, LifeError> {
    match value {
        JsonValue::String(clause) => {
            let mut parts = clause.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(column), None, None) => Ok(vec![(column.to_string(), SortOrder::Asc)]),
                (Some(column), Some(order), None) => Ok(vec![parse_order(column, order)?]),
                _ => Err(invalid("sort", value)),
            }
        }
        JsonValue::Array(items) => {
            let mut sort = Vec::new();
            for item in items {
                sort.extend(parse_sort(item)?);
            }
            Ok(sort)
        }
        JsonValue::Object(map) => map
            .iter()
            .map(|(column, order)| match order {
                JsonValue::String(order) => parse_order(column, order),
                other => Err(invalid("sort direction", other)),
            })
            .collect(),
        other => Err(invalid("sort", other)),
    }
}

fn parse_strategy(value: &JsonValue) -> Result<Strategy, LifeError> {
    match value.as_str() {
        Some("join") => Ok(Strategy::Join),
        Some("select") => Ok(Strategy::Select),
        _ => Err(invalid("strategy", value)),
    }
}
