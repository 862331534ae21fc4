//! Query execution for [`Query`] and [`CompiledQuery`].
//!
//! Running a query compiles it, executes the main statement and decorates the
//! resulting cursor. When deferred associations exist the cursor is buffered,
//! walked once to collect parent keys and rewound, then each deferred
//! association runs its follow-up statement and contributes a merge stage.

use crate::collection::Registry;
use crate::executor::{LifeError, LifeExecutor, Record, RowCursor};
use crate::query::normalize::ContainNode;
use crate::query::planner::CompiledQuery;
use crate::query::result::{BufferedCursor, Hydrator, ResultSet, RowPipeline};
use crate::query::select::Query;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

impl Query {
    /// Execute the query and return its decorated results
    ///
    /// # Errors
    ///
    /// Returns configuration errors from compiling and any driver error from
    /// the main or follow-up statements.
    pub fn execute<E>(&self, registry: &Registry, executor: &E) -> Result<ResultSet, LifeError>
    where
        E: LifeExecutor + ?Sized,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::contain_span(self.repository_alias().unwrap_or_default()).entered();

        let nodes = self.normalized_containments(registry)?;
        self.execute_nodes(registry, executor, &nodes)
    }

    /// Execute the query and collect every row
    pub fn to_vec<E>(&self, registry: &Registry, executor: &E) -> Result<Vec<Record>, LifeError>
    where
        E: LifeExecutor + ?Sized,
    {
        self.execute(registry, executor)?.to_vec()
    }

    /// Execute with containments that are already normalized
    pub(crate) fn execute_nodes<E>(
        &self,
        registry: &Registry,
        executor: &E,
        nodes: &[ContainNode],
    ) -> Result<ResultSet, LifeError>
    where
        E: LifeExecutor + ?Sized,
    {
        self.compile_nodes(registry, nodes)?.run(registry, executor)
    }
}

impl CompiledQuery {
    /// Execute the main statement and decorate its cursor
    pub fn run<E>(self, registry: &Registry, executor: &E) -> Result<ResultSet, LifeError>
    where
        E: LifeExecutor + ?Sized,
    {
        let (sql, values) = executor.backend().build(&self.statement());
        log::debug!("{}: {sql}", self.alias());
        let cursor = executor.query(&sql, &values)?;
        let hydrate = Hydrator::for_query(&self).into_stage();

        if !self.needs_eager_loading() {
            return Ok(ResultSet::new(RowPipeline::new(cursor).stage(hydrate)));
        }

        let mut source = BufferedCursor::promote(cursor);
        let keys = self.collect_keys(source.as_mut())?;
        source.rewind()?;

        let mut pipeline = RowPipeline::new(source).stage(hydrate);
        for deferred in &self.deferred {
            let parent_keys = keys
                .get(&deferred.parent_field())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let merge = deferred
                .node
                .association
                .eager_loader(registry, executor, parent_keys, deferred)?;
            pipeline = pipeline.stage(merge);
        }
        Ok(ResultSet::new(pipeline))
    }

    /// Parent key values per deferred load, read from the raw rows
    fn collect_keys(&self, cursor: &mut dyn RowCursor) -> Result<HashMap<String, Vec<JsonValue>>, LifeError> {
        let fields: Vec<String> = self.deferred.iter().map(|d| d.parent_field()).collect();
        let mut keys: HashMap<String, Vec<JsonValue>> = HashMap::new();
        let mut rows = 0usize;
        while let Some(row) = cursor.fetch()? {
            rows += 1;
            for field in &fields {
                if let Some(value) = row.get(field).filter(|v| !v.is_null()) {
                    keys.entry(field.clone()).or_default().push(value.clone());
                }
            }
        }
        log::trace!("collected keys from {rows} rows for {} deferred loads", fields.len());
        Ok(keys)
    }
}
