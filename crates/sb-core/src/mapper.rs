//! Row-to-model mapping
//!
//! A `Model` declares the columns it reads. The first time a model meets a
//! given result-set layout, the column names are resolved to ordinals once
//! and the resulting `ColumnMap` is memoized in a `MapperCache`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::MapError;
use crate::result::{ResultSet, Row};
use crate::value::{DbValue, FromValue};

/// A type that can be materialized from one result row
pub trait Model: Sized + Send + 'static {
    /// Columns read by `from_row`, matched case-insensitively
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &MappedRow<'_>) -> Result<Self, MapError>;
}

/// Model column → result-set ordinal for one layout
#[derive(Debug)]
pub struct ColumnMap {
    source: Arc<[String]>,
    model_columns: &'static [&'static str],
    ordinals: Vec<Option<usize>>,
}

impl ColumnMap {
    fn build(model_columns: &'static [&'static str], source: &Arc<[String]>) -> Self {
        let ordinals = model_columns
            .iter()
            .map(|wanted| source.iter().position(|c| c.eq_ignore_ascii_case(wanted)))
            .collect();
        Self {
            source: source.clone(),
            model_columns,
            ordinals,
        }
    }

    /// Whether this map was built for `columns`
    fn matches(&self, columns: &Arc<[String]>) -> bool {
        Arc::ptr_eq(&self.source, columns)
            || (self.source.len() == columns.len()
                && self
                    .source
                    .iter()
                    .zip(columns.iter())
                    .all(|(a, b)| a.eq_ignore_ascii_case(b)))
    }

    /// Ordinal of a model column in the result set
    pub fn ordinal(&self, column: &str) -> Option<usize> {
        self.model_columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.ordinals[i])
    }

    /// Pair this map with a row
    pub fn bind<'a>(&'a self, row: &'a Row) -> Result<MappedRow<'a>, MapError> {
        if row.values.len() != self.source.len() {
            return Err(MapError::RowWidth {
                expected: self.source.len(),
                actual: row.values.len(),
            });
        }
        Ok(MappedRow { map: self, row })
    }
}

/// A row viewed through a column map
#[derive(Debug, Clone, Copy)]
pub struct MappedRow<'a> {
    map: &'a ColumnMap,
    row: &'a Row,
}

impl<'a> MappedRow<'a> {
    /// Raw value of a column, `None` if the result set lacks it
    pub fn value(&self, column: &str) -> Option<&'a DbValue> {
        self.map
            .ordinal(column)
            .and_then(|i| self.row.values.get(i))
    }

    /// Convert a column to `T`
    ///
    /// A column absent from the result set reads as null, so `Option` fields
    /// tolerate it; anything else reports `MissingColumn`.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, MapError> {
        match self.value(column) {
            Some(value) => T::from_value(value),
            None => T::from_value(&DbValue::Null)
                .map_err(|_| MapError::MissingColumn(column.to_string())),
        }
    }
}

/// Memoized column maps keyed by (model type, result-set layout)
#[derive(Debug, Default)]
pub struct MapperCache {
    maps: RwLock<HashMap<(TypeId, u64), Arc<ColumnMap>>>,
}

impl MapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached maps
    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }

    /// Column map for `T` over the layout of `set`, built on first use
    pub fn column_map<T: Model>(&self, set: &ResultSet) -> Arc<ColumnMap> {
        let key = (TypeId::of::<T>(), set.layout());
        if let Some(map) = self.maps.read().get(&key) {
            if map.matches(set.columns()) {
                return map.clone();
            }
            // hash collision between two layouts; serve uncached
            return Arc::new(ColumnMap::build(T::COLUMNS, set.columns()));
        }

        let built = Arc::new(ColumnMap::build(T::COLUMNS, set.columns()));
        self.insert(key, built)
    }

    /// Cache `built` unless a map already sits under `key`
    ///
    /// The existing map is only returned if it was built for the same columns;
    /// another layout with the same hash may have won the insert.
    fn insert(&self, key: (TypeId, u64), built: Arc<ColumnMap>) -> Arc<ColumnMap> {
        let mut maps = self.maps.write();
        let cached = maps.entry(key).or_insert_with(|| built.clone());
        if cached.matches(&built.source) {
            cached.clone()
        } else {
            built
        }
    }

    /// Map every row of `set` to `T`
    pub fn map_rows<T: Model>(&self, set: &ResultSet) -> Result<Vec<T>, MapError> {
        if set.is_empty() {
            return Ok(Vec::new());
        }
        let map = self.column_map::<T>(set);
        set.rows()
            .iter()
            .map(|row| map.bind(row).and_then(|mapped| T::from_row(&mapped)))
            .collect()
    }
}
