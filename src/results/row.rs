use std::collections::HashMap;
use std::sync::Arc;

use super::from_row::FromRowValue;
use crate::error::PgMiddlewareError;
use crate::types::RowValues;

/// A row from a query result.
///
/// Column names and the name-to-index map are shared by every row of the
/// same result.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

pub(crate) fn index_columns(column_names: &[String]) -> Arc<HashMap<String, usize>> {
    // First occurrence wins for duplicated names, matching positional lookup.
    let mut map = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        map.entry(name.clone()).or_insert(i);
    }
    Arc::new(map)
}

impl CustomDbRow {
    /// Create a row, indexing its column names.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let column_index_cache = index_columns(&column_names);
        Self {
            column_names,
            rows,
            column_index_cache,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        rows: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            rows,
            column_index_cache,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index_cache.get(column_name).copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    /// Decode the named column into `T`.
    ///
    /// # Errors
    /// Returns `ExecutionError` for an unknown column and `TypeMismatch` when
    /// the value cannot be read as `T`.
    pub fn get_as<T: FromRowValue>(&self, column_name: &str) -> Result<T, PgMiddlewareError> {
        let value = self.get(column_name).ok_or_else(|| {
            PgMiddlewareError::ExecutionError(format!("no column named '{column_name}'"))
        })?;
        T::from_row_value(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
