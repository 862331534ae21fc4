//! Shared fixtures: an in-memory SQLite executor and the blog schema.

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use sea_query::{Value, Values};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use tether::{
    AssociationOptions, Backend, CollectionOptions, ColumnType, LifeError, LifeExecutor, Record,
    Registry, RowCursor,
};

/// Executes statements against an in-memory SQLite database and records them
pub struct SqliteExecutor {
    conn: Connection,
    statements: RefCell<Vec<String>>,
}

impl SqliteExecutor {
    pub fn new() -> Self {
        Self {
            conn: Connection::open_in_memory().unwrap(),
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn batch(&self, sql: &str) {
        self.conn.execute_batch(sql).unwrap();
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.borrow().len()
    }
}

/// Hands rows out once, like a driver statement that cannot rewind
struct StreamingCursor(std::vec::IntoIter<Record>);

impl RowCursor for StreamingCursor {
    fn fetch(&mut self) -> Result<Option<Record>, LifeError> {
        Ok(self.0.next())
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Bool(Some(b)) => SqliteValue::Integer(i64::from(*b)),
        Value::TinyInt(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        Value::SmallInt(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        Value::Int(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        Value::BigInt(Some(i)) => SqliteValue::Integer(*i),
        Value::TinyUnsigned(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        Value::SmallUnsigned(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        Value::Unsigned(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        Value::BigUnsigned(Some(u)) => SqliteValue::Integer(*u as i64),
        Value::Float(Some(f)) => SqliteValue::Real(f64::from(*f)),
        Value::Double(Some(d)) => SqliteValue::Real(*d),
        Value::String(Some(s)) => SqliteValue::Text(s.clone()),
        Value::Char(Some(c)) => SqliteValue::Text(c.to_string()),
        Value::Bytes(Some(b)) => SqliteValue::Blob(b.clone()),
        Value::Json(Some(j)) => SqliteValue::Text(j.to_string()),
        Value::Uuid(Some(u)) => SqliteValue::Text(u.to_string()),
        _ => SqliteValue::Null,
    }
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => JsonValue::from(f),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::from(bytes.to_vec()),
    }
}

impl LifeExecutor for SqliteExecutor {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn query(&self, query: &str, values: &Values) -> Result<Box<dyn RowCursor>, LifeError> {
        self.statements.borrow_mut().push(query.to_string());

        let mut stmt = self
            .conn
            .prepare(query)
            .map_err(|e| LifeError::QueryError(e.to_string()))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(params_from_iter(values.0.iter().map(to_sqlite)))
            .map_err(|e| LifeError::QueryError(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|e| LifeError::QueryError(e.to_string()))? {
            let mut record = Record::new();
            for (idx, name) in names.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| LifeError::ParseError(e.to_string()))?;
                record.insert(name.clone(), to_json(value));
            }
            records.push(record);
        }
        Ok(Box::new(StreamingCursor(records.into_iter())))
    }
}

/// Authors, their articles and the articles' comments
pub fn blog() -> (Registry, SqliteExecutor) {
    let executor = SqliteExecutor::new();
    executor.batch(
        "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE articles (id INTEGER PRIMARY KEY, title TEXT, body TEXT, author_id INTEGER, published INTEGER);
         CREATE TABLE comments (id INTEGER PRIMARY KEY, article_id INTEGER, comment TEXT);
         INSERT INTO authors VALUES (1, 'Chuck Norris'), (2, 'Bruce Lee');
         INSERT INTO articles VALUES (1, 'a title', 'a body', 1, 1), (2, 'another title', 'another body', 2, 1);",
    );

    let registry = Registry::new();
    registry.build(
        "author",
        CollectionOptions::new()
            .column("id", ColumnType::Integer)
            .column("name", ColumnType::String),
    );
    registry.build(
        "article",
        CollectionOptions::new()
            .column("id", ColumnType::Integer)
            .column("title", ColumnType::String)
            .column("body", ColumnType::Text)
            .column("author_id", ColumnType::Integer)
            .column("published", ColumnType::Boolean),
    );
    registry.build(
        "comment",
        CollectionOptions::new()
            .column("id", ColumnType::Integer)
            .column("article_id", ColumnType::Integer)
            .column("comment", ColumnType::Text),
    );

    registry
        .has_many("author", "article", AssociationOptions::new().property("articles"))
        .unwrap();
    registry
        .belongs_to("article", "author", AssociationOptions::new())
        .unwrap();
    registry
        .has_many("article", "comment", AssociationOptions::new().property("comments"))
        .unwrap();

    (registry, executor)
}

pub fn as_json(rows: Vec<Record>) -> JsonValue {
    JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect())
}
