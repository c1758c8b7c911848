//! Small builders for rows and queries used across tests.

use std::sync::Arc;

use crate::query::ParameterizedQuery;
use crate::results::CustomDbRow;
use crate::types::RowValues;

/// Create a test row with the given column names and values.
#[must_use]
pub fn create_test_row(column_names: &[&str], values: Vec<RowValues>) -> CustomDbRow {
    CustomDbRow::new(
        Arc::new(column_names.iter().map(|c| (*c).to_string()).collect()),
        values,
    )
}

/// Build a query, panicking on a malformed template. For tests only.
///
/// # Panics
/// Panics if the template or parameter count is invalid.
#[must_use]
pub fn query(sql: &str, params: Vec<RowValues>) -> ParameterizedQuery {
    match ParameterizedQuery::new(sql, params) {
        Ok(q) => q,
        Err(err) => panic!("invalid test query {sql:?}: {err}"),
    }
}

