//! Value conversion between sea-query, `may_postgres` and fetched rows.
//!
//! Three directions are needed:
//! - sea-query `Value`s bound into `may_postgres` statements as `ToSql`
//! - fetched JSON values turned back into sea-query `Value`s, so that collected
//!   parent keys can feed an `IN (...)` filter
//! - fetched JSON values turned into a stable grouping key
//!
//! Bound values must match the width of the column they are compared with:
//! the driver refuses an `i64` parameter for an `integer` column.
//! [`coerce_value`] retypes values after a column's [`ColumnType`].

use crate::collection::ColumnType;
use crate::executor::LifeError;
use may_postgres::types::ToSql;
use sea_query::{Value, Values};
use serde_json::Value as JsonValue;

/// Convert SeaQuery values to may_postgres ToSql parameters and run `f` with them.
///
/// The boxed parameters live for the duration of the closure, so the slice of
/// references handed to the driver stays valid.
///
/// # Errors
///
/// Returns `LifeError::Other` if an unsupported value type is encountered.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, LifeError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, LifeError>,
{
    let boxed = values
        .0
        .iter()
        .map(to_sql_param)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = boxed.iter().map(|p| p.as_ref()).collect();
    f(&params)
}

fn to_sql_param(value: &Value) -> Result<Box<dyn ToSql>, LifeError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let converted = match v {
                Some(u) => Some(i64::try_from(*u).map_err(|_| {
                    LifeError::Other(format!(
                        "BigUnsigned value {u} exceeds i64::MAX, cannot be bound"
                    ))
                })?),
                None => None,
            };
            Box::new(converted)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.clone()),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Json(v) => Box::new(v.as_ref().map(|j| (**j).clone())),
        Value::Uuid(v) => Box::new(*v),
        _ => {
            return Err(LifeError::Other(format!(
                "Unsupported value type in query: {value:?}"
            )));
        }
    };
    Ok(param)
}

/// Convert a fetched value into a sea-query value usable in a filter.
///
/// Returns `None` for JSON null: a NULL key never matches `IN (...)`.
pub fn json_to_value(value: &JsonValue) -> Option<Value> {
    let converted = match value {
        JsonValue::Null => return None,
        JsonValue::Bool(b) => Value::Bool(Some(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(Some(i))
            } else if let Some(u) = n.as_u64() {
                Value::BigUnsigned(Some(u))
            } else {
                Value::Double(n.as_f64())
            }
        }
        JsonValue::String(s) => Value::String(Some(s.clone())),
        other => Value::Json(Some(Box::new(other.clone()))),
    };
    Some(converted)
}

/// Retype `value` to the parameter type `column_type` is bound with.
///
/// Integers are narrowed or widened to the column's width; values that do not
/// fit, and values of other types, are returned unchanged.
pub fn coerce_value(value: Value, column_type: ColumnType) -> Value {
    let Some(int) = as_i64(&value) else {
        return match (column_type, value) {
            (ColumnType::Uuid, Value::String(Some(s))) => match uuid::Uuid::parse_str(&s) {
                Ok(id) => Value::Uuid(Some(id)),
                Err(_) => Value::String(Some(s)),
            },
            (_, value) => value,
        };
    };
    match column_type {
        ColumnType::SmallInteger => i16::try_from(int).map_or(value, |i| Value::SmallInt(Some(i))),
        ColumnType::Integer => i32::try_from(int).map_or(value, |i| Value::Int(Some(i))),
        ColumnType::BigInteger => Value::BigInt(Some(int)),
        _ => value,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(i)) => Some(i64::from(*i)),
        Value::SmallInt(Some(i)) => Some(i64::from(*i)),
        Value::Int(Some(i)) => Some(i64::from(*i)),
        Value::BigInt(Some(i)) => Some(*i),
        Value::TinyUnsigned(Some(u)) => Some(i64::from(*u)),
        Value::SmallUnsigned(Some(u)) => Some(i64::from(*u)),
        Value::Unsigned(Some(u)) => Some(i64::from(*u)),
        Value::BigUnsigned(Some(u)) => i64::try_from(*u).ok(),
        _ => None,
    }
}

/// Stable textual key for grouping rows by a fetched value
pub fn group_key(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
