//! Result decoration: buffering, hydration and merge stages.
//!
//! Rows come back flat, keyed `<alias>__<column>`. A [`ResultSet`] pulls them
//! through a [`RowPipeline`]: the hydrate stage first nests joined aliases
//! under their property paths, then one merge stage per deferred association
//! stitches in rows fetched by follow-up statements.

use crate::collection::Collection;
use crate::executor::{LifeError, Record, RowCursor};
use crate::query::planner::{AliasEntry, CompiledQuery};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::rc::Rc;

/// A transformation applied to every fetched row
pub type Stage = Box<dyn Fn(Record) -> Record>;

/// Rewindable wrapper around a streaming cursor.
///
/// Rows are kept as they are read, so the cursor can be walked once to
/// collect keys and again to produce results.
pub struct BufferedCursor {
    inner: Box<dyn RowCursor>,
    rows: Vec<Record>,
    position: usize,
    exhausted: bool,
}

impl BufferedCursor {
    pub fn new(inner: Box<dyn RowCursor>) -> Self {
        Self {
            inner,
            rows: Vec::new(),
            position: 0,
            exhausted: false,
        }
    }

    /// Wrap `cursor` unless it can already rewind
    pub fn promote(cursor: Box<dyn RowCursor>) -> Box<dyn RowCursor> {
        if cursor.is_buffered() {
            cursor
        } else {
            Box::new(BufferedCursor::new(cursor))
        }
    }
}

impl RowCursor for BufferedCursor {
    fn fetch(&mut self) -> Result<Option<Record>, LifeError> {
        if let Some(row) = self.rows.get(self.position) {
            self.position += 1;
            return Ok(Some(row.clone()));
        }
        if self.exhausted {
            return Ok(None);
        }
        match self.inner.fetch()? {
            Some(row) => {
                self.rows.push(row.clone());
                self.position += 1;
                Ok(Some(row))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn rewind(&mut self) -> Result<(), LifeError> {
        self.position = 0;
        Ok(())
    }

    fn is_buffered(&self) -> bool {
        true
    }
}

/// A cursor with stages applied to each row in order
pub struct RowPipeline {
    source: Box<dyn RowCursor>,
    stages: Vec<Stage>,
}

impl RowPipeline {
    pub fn new(source: Box<dyn RowCursor>) -> Self {
        Self {
            source,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl RowCursor for RowPipeline {
    fn fetch(&mut self) -> Result<Option<Record>, LifeError> {
        Ok(self
            .source
            .fetch()?
            .map(|row| self.stages.iter().fold(row, |row, stage| stage(row))))
    }

    fn rewind(&mut self) -> Result<(), LifeError> {
        self.source.rewind()
    }

    fn is_buffered(&self) -> bool {
        self.source.is_buffered()
    }
}

/// Decorated results of an executed query
pub struct ResultSet {
    pipeline: RowPipeline,
}

impl ResultSet {
    pub fn new(pipeline: RowPipeline) -> Self {
        Self { pipeline }
    }

    /// Drain the remaining rows
    pub fn to_vec(mut self) -> Result<Vec<Record>, LifeError> {
        let mut rows = Vec::new();
        while let Some(row) = self.pipeline.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl RowCursor for ResultSet {
    fn fetch(&mut self) -> Result<Option<Record>, LifeError> {
        self.pipeline.fetch()
    }

    fn rewind(&mut self) -> Result<(), LifeError> {
        self.pipeline.rewind()
    }

    fn is_buffered(&self) -> bool {
        self.pipeline.is_buffered()
    }
}

impl Iterator for ResultSet {
    type Item = Result<Record, LifeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pipeline.fetch().transpose()
    }
}

/// Turns flat `<alias>__<column>` rows into nested records
#[derive(Debug, Clone)]
pub struct Hydrator {
    paths: HashMap<String, (Vec<String>, Rc<Collection>)>,
    joined: Vec<Vec<String>>,
}

impl Hydrator {
    pub fn new(aliases: &[AliasEntry]) -> Self {
        let paths = aliases
            .iter()
            .map(|e| (e.alias.clone(), (e.path.clone(), Rc::clone(&e.collection))))
            .collect();
        let joined = aliases
            .iter()
            .filter(|e| !e.path.is_empty())
            .map(|e| e.path.clone())
            .collect();
        Self { paths, joined }
    }

    pub fn for_query(compiled: &CompiledQuery) -> Self {
        Self::new(compiled.alias_map())
    }

    /// Nest columns of joined aliases under their property path and cast
    /// values to their column types. Keys that do not name a known alias are
    /// kept as they are. A joined record whose columns are all NULL becomes
    /// `null`.
    pub fn hydrate(&self, row: Record) -> Record {
        let mut out = Record::new();
        for (key, value) in row {
            let resolved = key
                .split_once("__")
                .and_then(|(alias, column)| self.paths.get(alias).map(|entry| (entry, column)));
            match resolved {
                Some(((path, collection), column)) => {
                    let value = match collection.column(column) {
                        Some(c) => c.column_type.cast(value),
                        None => value,
                    };
                    ensure_path(&mut out, path).insert(column.to_string(), value);
                }
                None => {
                    out.insert(key, value);
                }
            }
        }

        // deepest first, so a parent holding only empty children collapses too
        for path in self.joined.iter().rev() {
            collapse_if_empty(&mut out, path);
        }
        out
    }

    pub fn into_stage(self) -> Stage {
        Box::new(move |row| self.hydrate(row))
    }
}

/// The record at `path`, creating empty records along the way
pub(crate) fn ensure_path<'a>(record: &'a mut Record, path: &[String]) -> &'a mut Record {
    let Some((head, rest)) = path.split_first() else {
        return record;
    };
    let slot = record
        .entry(head.clone())
        .or_insert_with(|| JsonValue::Object(Record::new()));
    if !slot.is_object() {
        *slot = JsonValue::Object(Record::new());
    }
    let JsonValue::Object(nested) = slot else {
        unreachable!("slot was just made an object");
    };
    ensure_path(nested, rest)
}

/// The record at `path`, if every step along it is a record
pub(crate) fn navigate_mut<'a>(record: &'a mut Record, path: &[String]) -> Option<&'a mut Record> {
    match path.split_first() {
        None => Some(record),
        Some((head, rest)) => match record.get_mut(head) {
            Some(JsonValue::Object(nested)) => navigate_mut(nested, rest),
            _ => None,
        },
    }
}

fn collapse_if_empty(record: &mut Record, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    if let Some(slot) = navigate_mut(record, parents).and_then(|parent| parent.get_mut(last)) {
        let empty = matches!(slot, JsonValue::Object(map) if map.values().all(JsonValue::is_null));
        if empty {
            *slot = JsonValue::Null;
        }
    }
}
