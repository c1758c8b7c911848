use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;

use super::CustomDbRow;
use crate::error::PgMiddlewareError;
use crate::typed_value::TypedValue;
use crate::types::RowValues;

/// Decode a single cell into a Rust value.
pub trait FromRowValue: Sized {
    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` when the cell has another shape.
    fn from_row_value(value: &RowValues) -> Result<Self, PgMiddlewareError>;
}

/// Decode a whole row into a caller-defined shape.
///
/// Tuples decode positionally:
/// ```rust
/// use std::sync::Arc;
/// use pg_middleware::prelude::*;
///
/// let row = CustomDbRow::new(
///     Arc::new(vec!["id".into(), "name".into()]),
///     vec![RowValues::Int(7), RowValues::Text("eth0".into())],
/// );
/// let (id, name): (i64, String) = FromDbRow::from_db_row(&row)?;
/// assert_eq!((id, name.as_str()), (7, "eth0"));
/// # Ok::<(), PgMiddlewareError>(())
/// ```
pub trait FromDbRow: Sized {
    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` when a column cannot be decoded.
    fn from_db_row(row: &CustomDbRow) -> Result<Self, PgMiddlewareError>;
}

fn mismatch(target: &str, value: &RowValues) -> PgMiddlewareError {
    PgMiddlewareError::type_mismatch(target, format!("cannot read a {} cell", value.kind_name()))
}

macro_rules! impl_from_row_value {
    ($ty:ty, $name:literal, |$v:ident| $body:expr) => {
        impl FromRowValue for $ty {
            fn from_row_value(value: &RowValues) -> Result<Self, PgMiddlewareError> {
                let $v = value;
                $body.ok_or_else(|| mismatch($name, value))
            }
        }
    };
}

impl_from_row_value!(i64, "i64", |v| v.as_int().copied());
impl_from_row_value!(f64, "f64", |v| v.as_float());
impl_from_row_value!(bool, "bool", |v| v.as_bool().copied());
impl_from_row_value!(String, "String", |v| match v {
    RowValues::Text(s) => Some(s.clone()),
    RowValues::Typed(tv) => tv.to_pg_text(),
    _ => None,
});
impl_from_row_value!(NaiveDateTime, "timestamp", |v| v.as_timestamp());
impl_from_row_value!(NaiveDate, "date", |v| v.as_date());
impl_from_row_value!(DateTime<Utc>, "timestamptz", |v| match v {
    RowValues::TimestampTz(ts) => Some(*ts),
    _ => None,
});
impl_from_row_value!(JsonValue, "json", |v| v.as_json().cloned());
impl_from_row_value!(Vec<u8>, "bytes", |v| v.as_blob().map(<[u8]>::to_vec));
impl_from_row_value!(TypedValue, "typed value", |v| v.as_typed().cloned());

impl FromRowValue for i32 {
    fn from_row_value(value: &RowValues) -> Result<Self, PgMiddlewareError> {
        value
            .as_int()
            .and_then(|i| i32::try_from(*i).ok())
            .ok_or_else(|| mismatch("i32", value))
    }
}

impl FromRowValue for RowValues {
    fn from_row_value(value: &RowValues) -> Result<Self, PgMiddlewareError> {
        Ok(value.clone())
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: &RowValues) -> Result<Self, PgMiddlewareError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

impl FromDbRow for CustomDbRow {
    fn from_db_row(row: &CustomDbRow) -> Result<Self, PgMiddlewareError> {
        Ok(row.clone())
    }
}

macro_rules! impl_from_db_row_tuple {
    ($len:literal => $($idx:tt : $t:ident),+) => {
        impl<$($t: FromRowValue),+> FromDbRow for ($($t,)+) {
            fn from_db_row(row: &CustomDbRow) -> Result<Self, PgMiddlewareError> {
                if row.len() < $len {
                    return Err(PgMiddlewareError::type_mismatch(
                        "row",
                        format!("expected {} column(s), row has {}", $len, row.len()),
                    ));
                }
                Ok(($($t::from_row_value(&row.rows[$idx])?,)+))
            }
        }
    };
}

impl_from_db_row_tuple!(1 => 0: A);
impl_from_db_row_tuple!(2 => 0: A, 1: B);
impl_from_db_row_tuple!(3 => 0: A, 1: B, 2: C);
impl_from_db_row_tuple!(4 => 0: A, 1: B, 2: C, 3: D);
impl_from_db_row_tuple!(5 => 0: A, 1: B, 2: C, 3: D, 4: E);
impl_from_db_row_tuple!(6 => 0: A, 1: B, 2: C, 3: D, 4: E, 5: F);
