//! The seam between the dispatcher and a concrete database driver.
//!
//! A backend is a `bb8::ManageConnection` whose connection implements
//! [`DriverConnection`]. The PostgreSQL backend lives in `crate::postgres`;
//! `crate::test_utils` provides a scripted one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bb8::ManageConnection;

use crate::error::PgMiddlewareError;
use crate::query::BoundStatement;
use crate::results::{CustomDbRow, ExecutionMetadata, ResultSet, index_columns};
use crate::types::RowValues;

/// A row as delivered by the driver, decoded one column at a time.
pub trait RawRow: Send {
    fn column_count(&self) -> usize;

    /// # Errors
    /// Returns `TypeMismatch` if the column cannot be represented as [`RowValues`].
    fn decode_column(&self, idx: usize) -> Result<RowValues, PgMiddlewareError>;
}

/// Forward-only source of raw rows for one statement execution.
#[async_trait]
pub trait RowSource: Send {
    type Row: RawRow;

    fn columns(&self) -> Arc<Vec<String>>;

    /// Next row, or `None` once the result is exhausted.
    async fn next_raw(&mut self) -> Result<Option<Self::Row>, PgMiddlewareError>;
}

/// Results of a batch up to the first failing statement.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: Vec<ExecutionMetadata>,
    pub failure: Option<(usize, PgMiddlewareError)>,
}

/// One physical connection. Executes at most one statement at a time.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    type Rows: RowSource + 'static;

    async fn query(&mut self, stmt: &BoundStatement) -> Result<Self::Rows, PgMiddlewareError>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, stmt: &BoundStatement) -> Result<u64, PgMiddlewareError>;

    /// Run statements in order, stopping at the first failure.
    async fn execute_batch(&mut self, stmts: &[BoundStatement]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (idx, stmt) in stmts.iter().enumerate() {
            match run_statement(self, stmt).await {
                Ok(meta) => outcome.completed.push(meta),
                Err(err) => {
                    outcome.failure = Some((idx, err));
                    break;
                }
            }
        }
        outcome
    }
}

/// A `bb8` manager whose connections speak [`DriverConnection`].
pub trait PoolBackend:
    ManageConnection<Connection: DriverConnection, Error = PgMiddlewareError>
{
}

impl<M> PoolBackend for M where
    M: ManageConnection<Connection: DriverConnection, Error = PgMiddlewareError>
{
}

/// Execute one statement, collecting `RETURNING` rows when it asks for them.
///
/// # Errors
/// Propagates driver and decode errors.
pub async fn run_statement<C: DriverConnection + ?Sized>(
    conn: &mut C,
    stmt: &BoundStatement,
) -> Result<ExecutionMetadata, PgMiddlewareError> {
    if stmt.returning {
        let rows = conn.query(stmt).await?;
        let keys = collect_rows(rows).await?;
        Ok(ExecutionMetadata {
            rows_affected: keys.len() as u64,
            generated_keys: Some(keys),
        })
    } else {
        Ok(ExecutionMetadata::new(conn.execute(stmt).await?))
    }
}

/// Decode every column of `raw`.
///
/// # Errors
/// Returns the first column decode error.
pub(crate) fn decode_row<R: RawRow>(
    raw: &R,
    columns: &Arc<Vec<String>>,
    index: &Arc<HashMap<String, usize>>,
) -> Result<CustomDbRow, PgMiddlewareError> {
    let mut values = Vec::with_capacity(raw.column_count());
    for idx in 0..raw.column_count() {
        values.push(raw.decode_column(idx)?);
    }
    Ok(CustomDbRow::with_index(
        Arc::clone(columns),
        Arc::clone(index),
        values,
    ))
}

/// Drain a row source into a [`ResultSet`].
///
/// # Errors
/// Returns the first transport or decode error.
pub async fn collect_rows<S: RowSource>(mut source: S) -> Result<ResultSet, PgMiddlewareError> {
    let columns = source.columns();
    let index = index_columns(&columns);
    let mut rs = ResultSet::default();
    rs.set_column_names(Arc::clone(&columns));
    while let Some(raw) = source.next_raw().await? {
        rs.add_row(decode_row(&raw, &columns, &index)?);
    }
    Ok(rs)
}
