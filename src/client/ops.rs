use bb8::PooledConnection;

use super::procedure::routine_error;
use super::{Client, ProcedureCall, ProcedureKind, ProcedureResult, RowStream};
use crate::driver::{DriverConnection, PoolBackend, run_statement};
use crate::error::PgMiddlewareError;
use crate::query::{Binder, BoundStatement, ParameterizedQuery};
use crate::results::{BatchMetadata, CustomDbRow, ExecutionMetadata, FromDbRow};

impl<M: PoolBackend> Client<M> {
    fn bind(&self, query: &ParameterizedQuery) -> BoundStatement {
        Binder::bind(query, &self.bind)
    }

    async fn checkout(&self) -> Result<PooledConnection<'static, M>, PgMiddlewareError> {
        self.pool()?.acquire(self.acquire_timeout).await
    }

    /// Run a query and stream its rows.
    ///
    /// The returned stream holds a pooled connection until it is exhausted,
    /// cancelled or dropped.
    ///
    /// # Errors
    /// Returns `ClosedResource` after close, `PoolTimeout` when no connection
    /// frees up in time, or the driver's error.
    pub async fn query(&self, query: &ParameterizedQuery) -> Result<RowStream<M>, PgMiddlewareError> {
        let stmt = self.bind(query);
        let mut conn = self.checkout().await?;
        let source = conn.query(&stmt).await?;
        Ok(RowStream::new(source, conn))
    }

    /// Run a query and return its first row.
    ///
    /// Rows after the first are discarded.
    ///
    /// # Errors
    /// Returns `NoRows` when the query produces no row, plus the errors of
    /// [`query`](Self::query).
    pub async fn query_row(&self, query: &ParameterizedQuery) -> Result<CustomDbRow, PgMiddlewareError> {
        let mut rows = self.query(query).await?;
        let first = rows.next_row().await;
        rows.cancel();
        first?.ok_or(PgMiddlewareError::NoRows)
    }

    /// [`query_row`](Self::query_row) decoded into `T`.
    ///
    /// # Errors
    /// Same as `query_row`, plus `TypeMismatch` from `T`.
    pub async fn query_row_as<T: FromDbRow>(
        &self,
        query: &ParameterizedQuery,
    ) -> Result<T, PgMiddlewareError> {
        T::from_db_row(&self.query_row(query).await?)
    }

    /// Run a statement that returns no row data.
    ///
    /// # Errors
    /// Returns `ClosedResource`, `PoolTimeout` or the driver's error.
    pub async fn execute(
        &self,
        query: &ParameterizedQuery,
    ) -> Result<ExecutionMetadata, PgMiddlewareError> {
        let stmt = self.bind(query);
        let mut conn = self.checkout().await?;
        run_statement(&mut *conn, &stmt).await
    }

    /// Run queries sharing one template, in order, on one connection.
    ///
    /// Not atomic: statements before a failure stay applied unless the caller
    /// wraps the batch in a transaction.
    ///
    /// # Errors
    /// Returns `ParameterError` when the queries do not share a template, and
    /// `BatchExecution` with the completed results when a statement fails.
    pub async fn batch_execute(
        &self,
        queries: &[ParameterizedQuery],
    ) -> Result<BatchMetadata, PgMiddlewareError> {
        let Some(first) = queries.first() else {
            self.pool()?;
            return Ok(BatchMetadata::default());
        };
        if let Some(pos) = queries
            .iter()
            .position(|q| !q.template().same_shape(first.template()))
        {
            return Err(PgMiddlewareError::ParameterError(format!(
                "batch query {pos} does not share the template of query 0"
            )));
        }
        let stmts: Vec<BoundStatement> = queries.iter().map(|q| self.bind(q)).collect();

        let mut conn = self.checkout().await?;
        let outcome = conn.execute_batch(&stmts).await;
        drop(conn);

        match outcome.failure {
            None => Ok(BatchMetadata {
                results: outcome.completed,
            }),
            Some((failed_index, source)) => {
                tracing::debug!(failed_index, completed = outcome.completed.len(), "batch stopped");
                Err(PgMiddlewareError::BatchExecution {
                    completed: outcome.completed,
                    failed_index,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Invoke a stored procedure or function.
    ///
    /// OUT values are decoded from the first row using the tags given in the
    /// call; a slot that fails to decode does not affect the others. A
    /// procedure call reads its result to the end, so errors raised while the
    /// procedure runs are reported here. Function calls return all their rows,
    /// first row included, as a stream whose server errors are also reported
    /// as `Procedure`.
    ///
    /// # Errors
    /// Returns `Procedure` when the server rejects the call or the routine
    /// fails, plus the errors of [`query`](Self::query).
    pub async fn call(&self, call: &ProcedureCall) -> Result<ProcedureResult<M>, PgMiddlewareError> {
        let query = call.to_query()?;
        let mut rows = self
            .query(&query)
            .await
            .map_err(|err| routine_error(call.name(), err))?
            .for_routine(call.name());
        let has_outs = !call.out_slots().is_empty();
        let is_procedure = call.kind() == ProcedureKind::Procedure;

        // The first row carries the OUT values. Procedure rows are only read
        // for their OUT values, so a row that fails to decode is not fatal.
        let out_params = if has_outs || is_procedure {
            match rows.next_row().await {
                Ok(first) => {
                    let outs = if has_outs {
                        call.decode_outs(first.as_ref())
                    } else {
                        Vec::new()
                    };
                    if let Some(row) = first {
                        rows.push_front(row);
                    }
                    outs
                }
                Err(err @ PgMiddlewareError::TypeMismatch { .. }) => call.failed_outs(&err.to_string()),
                Err(err) => return Err(err),
            }
        } else {
            Vec::new()
        };

        match call.kind() {
            ProcedureKind::Procedure => {
                drain(&mut rows).await?;
                Ok(ProcedureResult {
                    rows: None,
                    out_params,
                })
            }
            ProcedureKind::Function => Ok(ProcedureResult {
                rows: Some(rows),
                out_params,
            }),
        }
    }
}

/// Read a stream to its end. Rows that fail to decode are skipped; an error
/// that ends the stream is returned.
async fn drain<M: PoolBackend>(rows: &mut RowStream<M>) -> Result<(), PgMiddlewareError> {
    loop {
        match rows.next_row().await {
            Ok(Some(_)) | Err(PgMiddlewareError::TypeMismatch { .. }) => {}
            Ok(None) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}
