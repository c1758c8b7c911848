use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Row, RowStream, Statement};

use super::cache::CacheKey;
use super::manager::PgConnection;
use crate::driver::{DriverConnection, RawRow, RowSource};
use crate::error::PgMiddlewareError;
use crate::query::BoundStatement;
use crate::typed_value::{RawValue, TypeTag, TypedValue, decode_binary, decode_numeric};
use crate::types::RowValues;

/// The undecoded bytes of one cell, whatever its type.
struct RawCell<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawCell(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Flatten a driver error into `ExecutionError`, keeping the SQLSTATE.
pub(crate) fn execution_error(err: tokio_postgres::Error) -> PgMiddlewareError {
    match err.as_db_error() {
        Some(db) => PgMiddlewareError::ExecutionError(format!(
            "{} ({})",
            db.message(),
            db.code().code()
        )),
        None => PgMiddlewareError::ExecutionError(err.to_string()),
    }
}

fn native<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> Result<T, PgMiddlewareError> {
    T::from_sql(ty, raw).map_err(|e| PgMiddlewareError::type_mismatch(ty.name(), e.to_string()))
}

/// Map one binary result cell to a `RowValues`.
fn extract_value(ty: &Type, raw: Option<&[u8]>) -> Result<RowValues, PgMiddlewareError> {
    let Some(raw) = raw else {
        return Ok(RowValues::Null);
    };
    let value = match *ty {
        Type::INT2 => RowValues::Int(i64::from(native::<i16>(ty, raw)?)),
        Type::INT4 => RowValues::Int(i64::from(native::<i32>(ty, raw)?)),
        Type::INT8 => RowValues::Int(native::<i64>(ty, raw)?),
        Type::FLOAT4 => RowValues::Float(f64::from(native::<f32>(ty, raw)?)),
        Type::FLOAT8 => RowValues::Float(native::<f64>(ty, raw)?),
        Type::BOOL => RowValues::Bool(native::<bool>(ty, raw)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            RowValues::Text(native::<String>(ty, raw)?)
        }
        Type::TIMESTAMP => RowValues::Timestamp(native::<NaiveDateTime>(ty, raw)?),
        Type::TIMESTAMPTZ => RowValues::TimestampTz(native::<DateTime<Utc>>(ty, raw)?),
        Type::DATE => RowValues::Date(native::<NaiveDate>(ty, raw)?),
        Type::JSON | Type::JSONB => RowValues::JSON(native::<Value>(ty, raw)?),
        Type::BYTEA => RowValues::Blob(native::<Vec<u8>>(ty, raw)?),
        Type::NUMERIC => RowValues::Text(
            decode_numeric(raw).map_err(|reason| PgMiddlewareError::type_mismatch("numeric", reason))?,
        ),
        _ => return extract_other(ty, raw),
    };
    Ok(value)
}

fn extract_other(ty: &Type, raw: &[u8]) -> Result<RowValues, PgMiddlewareError> {
    if let Some(tag) = TypeTag::from_oid(ty.oid()) {
        return decode_binary(tag, None, raw).map(RowValues::Typed);
    }
    match ty.kind() {
        Kind::Domain(base) => extract_value(base, Some(raw)),
        Kind::Enum(_) => {
            let label = native::<String>(&Type::TEXT, raw)?;
            TypedValue::new(
                TypeTag::Enum,
                RawValue::from(vec![ty.name().to_string(), label]),
            )
            .map(RowValues::Typed)
        }
        // Composites, arrays and extension types have no portable binary
        // form here; hand back the bytes.
        _ => match std::str::from_utf8(raw) {
            Ok(text) if matches!(ty.kind(), Kind::Simple) => Ok(RowValues::Typed(
                TypedValue::new(
                    TypeTag::Custom,
                    RawValue::from(vec![ty.name().to_string(), text.to_string()]),
                )?,
            )),
            _ => Ok(RowValues::Blob(raw.to_vec())),
        },
    }
}

impl RawRow for Row {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn decode_column(&self, idx: usize) -> Result<RowValues, PgMiddlewareError> {
        let ty = self
            .columns()
            .get(idx)
            .map(|c| c.type_().clone())
            .ok_or_else(|| PgMiddlewareError::ExecutionError(format!("column {idx} out of range")))?;
        let cell: Option<RawCell<'_>> = self
            .try_get(idx)
            .map_err(|e| PgMiddlewareError::type_mismatch(ty.name(), e.to_string()))?;
        extract_value(&ty, cell.map(|c| c.0))
    }
}

/// Rows streamed from a portal.
pub struct PgRowSource {
    stream: Pin<Box<RowStream>>,
    columns: Arc<Vec<String>>,
}

#[async_trait]
impl RowSource for PgRowSource {
    type Row = Row;

    fn columns(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    async fn next_raw(&mut self) -> Result<Option<Row>, PgMiddlewareError> {
        self.stream.next().await.transpose().map_err(execution_error)
    }
}

impl PgConnection {
    fn cache_key(stmt: &BoundStatement) -> (CacheKey, Vec<Type>) {
        let types: Vec<Type> = stmt
            .params
            .iter()
            .map(|p| p.hint.oid.and_then(Type::from_oid).unwrap_or(Type::UNKNOWN))
            .collect();
        let key = CacheKey {
            sql: Arc::clone(&stmt.sql),
            param_oids: types.iter().map(Type::oid).collect(),
        };
        (key, types)
    }

    async fn prepare(&mut self, stmt: &BoundStatement) -> Result<Statement, PgMiddlewareError> {
        let (key, types) = Self::cache_key(stmt);
        if let Some(prepared) = self.cache.get(&key) {
            tracing::debug!(sql = %stmt.sql, "statement cache hit");
            return Ok(prepared);
        }
        let prepared = self
            .client
            .prepare_typed(&stmt.sql, &types)
            .await
            .map_err(execution_error)?;
        self.cache.record(key, &prepared);
        Ok(prepared)
    }
}

#[async_trait]
impl DriverConnection for PgConnection {
    type Rows = PgRowSource;

    async fn query(&mut self, stmt: &BoundStatement) -> Result<PgRowSource, PgMiddlewareError> {
        let prepared = self.prepare(stmt).await?;
        let columns = prepared
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = self
            .client
            .query_raw(&prepared, stmt.params.iter())
            .await
            .map_err(execution_error)?;
        Ok(PgRowSource {
            stream: Box::pin(rows),
            columns: Arc::new(columns),
        })
    }

    async fn execute(&mut self, stmt: &BoundStatement) -> Result<u64, PgMiddlewareError> {
        let prepared = self.prepare(stmt).await?;
        self.client
            .execute_raw(&prepared, stmt.params.iter())
            .await
            .map_err(execution_error)
    }
}
