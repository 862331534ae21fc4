//! Filter predicates shared by associations, containment options and queries.
//!
//! Predicates name columns either bare (`id`) or qualified (`article.id`).
//! Bare columns are qualified with the alias of the collection they filter
//! when they are attached to a statement.

use crate::collection::ColumnType;
use crate::query::value_conversion::coerce_value;
use sea_query::{Alias, Condition, Expr, ExprTrait, Value};
use std::fmt;

/// A single conjunct of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
    /// `column IS NULL`
    IsNull(String),
    /// `left_column = right_column`
    Columns(String, String),
    /// SQL fragment inserted verbatim
    Raw(String),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn columns(left: impl Into<String>, right: impl Into<String>) -> Self {
        Predicate::Columns(left.into(), right.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Predicate::Raw(sql.into())
    }

    /// Prefix bare column names with `alias`
    pub fn qualify(&self, alias: &str) -> Predicate {
        match self {
            Predicate::Eq(c, v) => Predicate::Eq(qualify(c, alias), v.clone()),
            Predicate::In(c, vs) => Predicate::In(qualify(c, alias), vs.clone()),
            Predicate::IsNull(c) => Predicate::IsNull(qualify(c, alias)),
            Predicate::Columns(l, r) => Predicate::Columns(qualify(l, alias), qualify(r, alias)),
            Predicate::Raw(sql) => Predicate::Raw(sql.clone()),
        }
    }

    /// Retype bound values after the column they are compared with, as
    /// reported by `column_type`
    pub fn coerce(&self, column_type: impl Fn(&str) -> Option<ColumnType>) -> Predicate {
        match self {
            Predicate::Eq(c, v) => Predicate::Eq(c.clone(), typed_value(v, column_type(c))),
            Predicate::In(c, vs) => {
                let ty = column_type(c);
                Predicate::In(c.clone(), vs.iter().map(|v| typed_value(v, ty)).collect())
            }
            other => other.clone(),
        }
    }

    /// Convert into a sea-query condition
    pub fn to_condition(&self) -> Condition {
        let cond = Condition::all();
        match self {
            Predicate::Eq(c, v) => cond.add(column_expr(c).eq(v.clone())),
            Predicate::In(c, vs) => cond.add(column_expr(c).is_in(vs.iter().cloned())),
            Predicate::IsNull(c) => cond.add(column_expr(c).is_null()),
            Predicate::Columns(l, r) => cond.add(column_expr(l).equals(column_ref(r))),
            Predicate::Raw(sql) => cond.add(Expr::cust(sql.clone())),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(c, v) => write!(f, "{c} = {}", sql_literal(v)),
            Predicate::In(c, vs) => {
                let list = vs.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
                write!(f, "{c} IN ({list})")
            }
            Predicate::IsNull(c) => write!(f, "{c} IS NULL"),
            Predicate::Columns(l, r) => write!(f, "{l} = {r}"),
            Predicate::Raw(sql) => f.write_str(sql),
        }
    }
}

fn typed_value(value: &Value, column_type: Option<ColumnType>) -> Value {
    match column_type {
        Some(ty) => coerce_value(value.clone(), ty),
        None => value.clone(),
    }
}

/// Combine predicates into one conjunctive condition
pub fn all_of<'a>(predicates: impl IntoIterator<Item = &'a Predicate>) -> Condition {
    predicates
        .into_iter()
        .fold(Condition::all(), |cond, p| cond.add(p.to_condition()))
}

/// `alias.column` unless `column` is already qualified
pub fn qualify(column: &str, alias: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{alias}.{column}")
    }
}

/// Column reference for a possibly qualified column name
pub(crate) fn column_ref(column: &str) -> sea_query::ColumnRef {
    use sea_query::IntoColumnRef;

    match column.split_once('.') {
        Some((table, col)) => (Alias::new(table), Alias::new(col)).into_column_ref(),
        None => Alias::new(column).into_column_ref(),
    }
}

pub(crate) fn column_expr(column: &str) -> Expr {
    Expr::col(column_ref(column))
}

/// Render a value the way it would read in SQL; for display only, never executed
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Bool(Some(b)) => b.to_string(),
        Value::TinyInt(Some(i)) => i.to_string(),
        Value::SmallInt(Some(i)) => i.to_string(),
        Value::Int(Some(i)) => i.to_string(),
        Value::BigInt(Some(i)) => i.to_string(),
        Value::TinyUnsigned(Some(u)) => u.to_string(),
        Value::SmallUnsigned(Some(u)) => u.to_string(),
        Value::Unsigned(Some(u)) => u.to_string(),
        Value::BigUnsigned(Some(u)) => u.to_string(),
        Value::Float(Some(f)) => f.to_string(),
        Value::Double(Some(d)) => d.to_string(),
        Value::String(Some(s)) => format!("'{}'", s.replace('\'', "''")),
        Value::Char(Some(c)) => format!("'{c}'"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{PostgresQueryBuilder, Query};

    #[test]
    fn test_qualify_leaves_qualified_columns() {
        assert_eq!(qualify("id", "article"), "article.id");
        assert_eq!(qualify("author.id", "article"), "author.id");
    }

    #[test]
    fn test_predicate_display() {
        assert_eq!(Predicate::eq("article.id", 2).to_string(), "article.id = 2");
        assert_eq!(
            Predicate::columns("client.id", "foo.client_id").to_string(),
            "client.id = foo.client_id"
        );
        assert_eq!(
            Predicate::is_in("article.author_id", [1, 2]).to_string(),
            "article.author_id IN (1, 2)"
        );
        assert_eq!(Predicate::eq("name", "it's").to_string(), "name = 'it''s'");
    }

    #[test]
    fn test_predicate_qualify_all_variants() {
        let p = Predicate::columns("id", "author.article_id").qualify("article");
        assert_eq!(p, Predicate::columns("article.id", "author.article_id"));
        let p = Predicate::raw("1 = 1").qualify("article");
        assert_eq!(p, Predicate::raw("1 = 1"));
    }

    #[test]
    fn test_coerce_follows_column_types() {
        let types = |column: &str| match column {
            "article.author_id" => Some(ColumnType::Integer),
            "article.views" => Some(ColumnType::BigInteger),
            _ => None,
        };

        let p = Predicate::is_in("article.author_id", [1i64, 2i64]).coerce(types);
        assert_eq!(p, Predicate::In("article.author_id".into(), vec![Value::Int(Some(1)), Value::Int(Some(2))]));

        let p = Predicate::eq("article.views", 3i32).coerce(types);
        assert_eq!(p, Predicate::Eq("article.views".into(), Value::BigInt(Some(3))));

        let p = Predicate::eq("article.title", 3i64).coerce(types);
        assert_eq!(p, Predicate::eq("article.title", 3i64));
    }

    #[test]
    fn test_predicate_to_condition_renders() {
        let mut query = Query::select();
        query
            .column(Alias::new("id"))
            .from(Alias::new("articles"))
            .cond_where(all_of(&[
                Predicate::eq("article.id", 2),
                Predicate::is_null("article.deleted"),
            ]));
        let sql = query.to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""article"."id" = 2"#), "{sql}");
        assert!(sql.contains(r#""article"."deleted" IS NULL"#), "{sql}");
    }
}
