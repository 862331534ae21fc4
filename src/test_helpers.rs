//! Test doubles for the executor.
//!
//! [`MockExecutor`] records every statement it is asked to run and answers
//! with result sets queued up front, one per statement in order. Once the
//! queue is empty it answers with no rows.

use crate::executor::{Backend, LifeError, LifeExecutor, Record, RowCursor, VecCursor};
use sea_query::Values;
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct MockExecutor {
    backend: Backend,
    results: RefCell<VecDeque<Result<Vec<Record>, LifeError>>>,
    captured_sql: RefCell<Vec<String>>,
    captured_values: RefCell<Vec<Values>>,
}

impl MockExecutor {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Queue result sets, answered in order
    pub fn append_query_results<I>(self, results: I) -> Self
    where
        I: IntoIterator<Item = Vec<Record>>,
    {
        self.results
            .borrow_mut()
            .extend(results.into_iter().map(Ok));
        self
    }

    /// Queue a failure for the next statement
    pub fn append_query_error(self, error: LifeError) -> Self {
        self.results.borrow_mut().push_back(Err(error));
        self
    }

    pub fn captured_sql(&self) -> Vec<String> {
        self.captured_sql.borrow().clone()
    }

    pub fn captured_values(&self) -> Vec<Values> {
        self.captured_values.borrow().clone()
    }

    /// Number of statements run so far
    pub fn query_count(&self) -> usize {
        self.captured_sql.borrow().len()
    }

    pub fn clear(&self) {
        self.captured_sql.borrow_mut().clear();
        self.captured_values.borrow_mut().clear();
    }
}

impl LifeExecutor for MockExecutor {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn query(&self, query: &str, values: &Values) -> Result<Box<dyn RowCursor>, LifeError> {
        self.captured_sql.borrow_mut().push(query.to_string());
        self.captured_values.borrow_mut().push(values.clone());
        let rows = self.results.borrow_mut().pop_front().unwrap_or(Ok(Vec::new()))?;
        Ok(Box::new(VecCursor::new(rows)))
    }
}
