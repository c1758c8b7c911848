use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bb8::{ManageConnection, PooledConnection};

use super::procedure::routine_error;
use crate::driver::{DriverConnection, PoolBackend, RowSource, decode_row};
use crate::error::PgMiddlewareError;
use crate::results::{CustomDbRow, FromDbRow, ResultSet, index_columns};

type SourceOf<M> = <<M as ManageConnection>::Connection as DriverConnection>::Rows;

/// A lazy, forward-only sequence of rows that owns its pooled connection.
///
/// The connection goes back to the pool as soon as the rows are exhausted, a
/// transport error occurs, [`cancel`](Self::cancel) is called, or the stream is
/// dropped. A row that fails to decode is reported on its own; the rows after
/// it can still be read.
pub struct RowStream<M: PoolBackend> {
    replay: VecDeque<CustomDbRow>,
    // Declared before `conn` so the source is dropped first.
    source: Option<SourceOf<M>>,
    conn: Option<PooledConnection<'static, M>>,
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    rows_read: u64,
    // Server errors are reported as failures of this routine.
    routine: Option<Arc<str>>,
}

impl<M: PoolBackend> std::fmt::Debug for RowStream<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .field("rows_read", &self.rows_read)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<M: PoolBackend> RowStream<M> {
    pub(crate) fn new(source: SourceOf<M>, conn: PooledConnection<'static, M>) -> Self {
        let columns = source.columns();
        let index = index_columns(&columns);
        Self {
            replay: VecDeque::new(),
            source: Some(source),
            conn: Some(conn),
            columns,
            index,
            rows_read: 0,
            routine: None,
        }
    }

    /// Rows produced by a stored routine call.
    pub(crate) fn for_routine(mut self, name: &str) -> Self {
        self.routine = Some(Arc::from(name));
        self
    }

    /// Put an already read row back in front of the stream.
    pub(crate) fn push_front(&mut self, row: CustomDbRow) {
        self.rows_read = self.rows_read.saturating_sub(1);
        self.replay.push_front(row);
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<Vec<String>> {
        &self.columns
    }

    /// Rows handed out so far, including rows that failed to decode.
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Whether the stream still holds its connection.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Advance to the next row.
    ///
    /// Returns `Ok(None)` once exhausted; calling again keeps returning `Ok(None)`.
    ///
    /// # Errors
    /// Returns `TypeMismatch` for a row that cannot be decoded (the stream
    /// stays usable), or the driver error that ended the stream. Streams
    /// returned by [`Client::call`](super::Client::call) report server errors
    /// as `Procedure`.
    pub async fn next_row(&mut self) -> Result<Option<CustomDbRow>, PgMiddlewareError> {
        if let Some(row) = self.replay.pop_front() {
            self.rows_read += 1;
            return Ok(Some(row));
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        match source.next_raw().await {
            Ok(Some(raw)) => {
                self.rows_read += 1;
                decode_row(&raw, &self.columns, &self.index)
                    .map(Some)
                    .inspect_err(|e| {
                        tracing::warn!(row = self.rows_read, error = %e, "row failed to decode");
                    })
            }
            Ok(None) => {
                self.release();
                Ok(None)
            }
            Err(err) => {
                self.release();
                Err(match &self.routine {
                    Some(name) => routine_error(name, err),
                    None => err,
                })
            }
        }
    }

    /// Advance and decode the row into `T`.
    ///
    /// # Errors
    /// Same as [`next_row`](Self::next_row), plus `TypeMismatch` from `T`.
    pub async fn next_as<T: FromDbRow>(&mut self) -> Result<Option<T>, PgMiddlewareError> {
        match self.next_row().await? {
            Some(row) => T::from_db_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Read every remaining row into a [`ResultSet`].
    ///
    /// # Errors
    /// Returns the first decode or driver error; the connection is released.
    pub async fn collect(mut self) -> Result<ResultSet, PgMiddlewareError> {
        let mut rs = ResultSet::default();
        rs.set_column_names(Arc::clone(&self.columns));
        while let Some(row) = self.next_row().await? {
            rs.add_row(row);
        }
        Ok(rs)
    }

    /// Stop reading and give the connection back to the pool.
    pub fn cancel(&mut self) {
        self.replay.clear();
        if self.is_open() {
            tracing::debug!(rows_read = self.rows_read, "row stream cancelled");
        }
        self.release();
    }

    fn release(&mut self) {
        self.source = None;
        if self.conn.take().is_some() {
            tracing::debug!("released connection");
        }
    }
}
