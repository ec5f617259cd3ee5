//! Result sets returned by provider commands

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::MapError;
use crate::mapper::{MapperCache, Model};
use crate::value::DbValue;

/// One row of column values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub values: Vec<DbValue>,
}

impl Row {
    pub fn new(values: Vec<DbValue>) -> Self {
        Self { values }
    }
}

impl From<Vec<DbValue>> for Row {
    fn from(values: Vec<DbValue>) -> Self {
        Self::new(values)
    }
}

/// A tabular result: column names plus rows
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    layout: u64,
}

impl ResultSet {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, rows: Vec<Row>) -> Self {
        let columns: Arc<[String]> = columns.into_iter().map(Into::into).collect();
        let layout = layout_hash(&columns);
        Self {
            columns,
            rows,
            layout,
        }
    }

    /// A result set with columns but no rows
    pub fn empty<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Hash of the column layout, case-insensitive
    pub fn layout(&self) -> u64 {
        self.layout
    }

    /// First column of the first row
    pub fn scalar(&self) -> Option<&DbValue> {
        self.rows.first().and_then(|row| row.values.first())
    }

    /// Map every row to `T`
    pub fn to_list<T: Model>(&self, cache: &MapperCache) -> Result<Vec<T>, MapError> {
        cache.map_rows(self)
    }

    /// Map the first row to `T`, `None` when the set is empty
    pub fn to_single<T: Model>(&self, cache: &MapperCache) -> Result<Option<T>, MapError> {
        match self.rows.first() {
            Some(row) => {
                let map = cache.column_map::<T>(self);
                map.bind(row).and_then(|mapped| T::from_row(&mapped)).map(Some)
            }
            None => Ok(None),
        }
    }
}

fn layout_hash(columns: &[String]) -> u64 {
    let mut hasher = DefaultHasher::new();
    columns.len().hash(&mut hasher);
    for column in columns {
        column.to_ascii_lowercase().hash(&mut hasher);
    }
    hasher.finish()
}

/// Ordered result sets produced by one command, consumed front to back
#[derive(Debug, Clone, Default)]
pub struct QueryResults {
    sets: VecDeque<ResultSet>,
}

impl QueryResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, set: ResultSet) {
        self.sets.push_back(set);
    }

    /// Number of result sets not yet consumed
    pub fn remaining(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Peek at the next result set without consuming it
    pub fn peek(&self) -> Option<&ResultSet> {
        self.sets.front()
    }

    pub fn next_result_set(&mut self) -> Option<ResultSet> {
        self.sets.pop_front()
    }

    /// Consume the next result set as a list; missing set yields an empty list
    pub fn next_list<T: Model>(&mut self, cache: &MapperCache) -> Result<Vec<T>, MapError> {
        match self.sets.pop_front() {
            Some(set) => set.to_list(cache),
            None => Ok(Vec::new()),
        }
    }

    /// Consume the next result set and map its first row
    pub fn next_single<T: Model>(&mut self, cache: &MapperCache) -> Result<Option<T>, MapError> {
        match self.sets.pop_front() {
            Some(set) => set.to_single(cache),
            None => Ok(None),
        }
    }
}

impl FromIterator<ResultSet> for QueryResults {
    fn from_iter<I: IntoIterator<Item = ResultSet>>(iter: I) -> Self {
        Self {
            sets: iter.into_iter().collect(),
        }
    }
}

impl From<ResultSet> for QueryResults {
    fn from(set: ResultSet) -> Self {
        std::iter::once(set).collect()
    }
}
