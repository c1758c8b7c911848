use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;

use crate::typed_value::{TypeTag, TypedValue};

/// Values that can be used as query parameters or read back from a result row.
///
/// Plain variants map onto PostgreSQL's native types; domain types (network
/// addresses, geometry, ranges, ...) travel as [`RowValues::Typed`]:
/// ```rust
/// use pg_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(42),
///     RowValues::Typed(TypedValue::inet("192.168.1.1")?),
/// ];
/// # let _ = params;
/// # Ok::<(), PgMiddlewareError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone
    TimestampTz(DateTime<Utc>),
    /// Calendar date
    Date(NaiveDate),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// A PostgreSQL domain-typed value
    Typed(TypedValue),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Typed(tv) => tv.is_null(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::TimestampTz(value) => Some(value.naive_utc()),
            RowValues::Text(s) => {
                // Try "YYYY-MM-DD HH:MM:SS"
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Some(dt);
                }
                // Try "YYYY-MM-DD HH:MM:SS.SSS"
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f").ok()
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowValues::Date(value) => Some(*value),
            RowValues::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let RowValues::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_typed(&self) -> Option<&TypedValue> {
        if let RowValues::Typed(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Short name of the variant, used in mismatch messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "int",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "bool",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::TimestampTz(_) => "timestamptz",
            RowValues::Date(_) => "date",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
            RowValues::Typed(tv) => tv.tag().pg_name(),
        }
    }
}

impl From<TypedValue> for RowValues {
    fn from(value: TypedValue) -> Self {
        RowValues::Typed(value)
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// PostgreSQL type a parameter is declared as when the statement is prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamType {
    /// Type name as PostgreSQL spells it (`int8`, `inet`, or a user type name).
    pub name: String,
    /// Builtin OID, if the type has a fixed one.
    pub oid: Option<u32>,
}

impl ParamType {
    /// Let the server infer the parameter type from context.
    #[must_use]
    pub fn unspecified() -> Self {
        Self {
            name: "unknown".to_string(),
            oid: None,
        }
    }

    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        self.oid.is_none() && self.name == "unknown"
    }

    fn builtin(name: &str, oid: u32) -> Self {
        Self {
            name: name.to_string(),
            oid: Some(oid),
        }
    }

    /// Default PostgreSQL type for a parameter value.
    #[must_use]
    pub fn for_value(value: &RowValues) -> Self {
        match value {
            RowValues::Int(_) => Self::builtin("int8", 20),
            RowValues::Float(_) => Self::builtin("float8", 701),
            RowValues::Text(_) => Self::builtin("text", 25),
            RowValues::Bool(_) => Self::builtin("bool", 16),
            RowValues::Timestamp(_) => Self::builtin("timestamp", 1114),
            RowValues::TimestampTz(_) => Self::builtin("timestamptz", 1184),
            RowValues::Date(_) => Self::builtin("date", 1082),
            RowValues::Null => Self::unspecified(),
            RowValues::JSON(_) => Self::builtin("jsonb", 3802),
            RowValues::Blob(_) => Self::builtin("bytea", 17),
            RowValues::Typed(tv) => Self::for_tag(tv.tag(), tv.user_type_name()),
        }
    }

    /// Type hint for a domain tag. User-defined types carry their own name and
    /// no fixed OID.
    #[must_use]
    pub fn for_tag(tag: TypeTag, user_type_name: Option<&str>) -> Self {
        match (tag.oid(), user_type_name) {
            (Some(oid), _) => Self::builtin(tag.pg_name(), oid),
            (None, Some(name)) => Self {
                name: name.to_string(),
                oid: None,
            },
            (None, None) => Self::unspecified(),
        }
    }
}

/// How a bound parameter is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// PostgreSQL text input syntax.
    Text,
    /// PostgreSQL binary send/recv format.
    Binary,
}
