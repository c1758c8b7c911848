//! Tagged wrappers for PostgreSQL domain types.
//!
//! A [`TypedValue`] pairs a [`TypeTag`] with a [`RawValue`] payload whose shape
//! has been checked against the tag's structural constraint. Values are built
//! right before binding and never change afterwards.

mod binary;
mod tags;
mod text;
mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::PgMiddlewareError;
use crate::types::RowValues;

pub use binary::{decode_binary, encode_binary};
pub(crate) use binary::can_encode_binary;
#[cfg(feature = "postgres")]
pub(crate) use binary::decode_numeric;
pub use tags::{DECLARATIONS, RangeElement, TagDecl, TypeTag};

/// Untyped payload of a [`TypedValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<RawValue>),
    Json(JsonValue),
}

impl RawValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RawValue::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            RawValue::Int(i) => Some(*i as f64),
            RawValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[RawValue]> {
        if let RawValue::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    pub(crate) fn shape(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::Float(_) => "float",
            RawValue::Text(_) => "text",
            RawValue::Bytes(_) => "bytes",
            RawValue::List(_) => "list",
            RawValue::Json(_) => "json",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<JsonValue> for RawValue {
    fn from(value: JsonValue) -> Self {
        RawValue::Json(value)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(value: Vec<T>) -> Self {
        RawValue::List(value.into_iter().map(Into::into).collect())
    }
}

/// A domain-typed value ready to bind as a query parameter.
///
/// ```rust
/// use pg_middleware::prelude::*;
///
/// let p = TypedValue::point(1.5, -2.0)?;
/// assert_eq!(p.tag(), TypeTag::Point);
/// assert!(TypedValue::new(TypeTag::Point, vec![1.0, 2.0, 3.0].into()).is_err());
/// # Ok::<(), PgMiddlewareError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    tag: TypeTag,
    raw: RawValue,
    nullable: bool,
}

impl TypedValue {
    /// Construct a non-null value, checking `raw` against the tag's constraint.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if the payload shape does not fit the tag.
    pub fn new(tag: TypeTag, raw: RawValue) -> Result<Self, PgMiddlewareError> {
        if matches!(raw, RawValue::Null) {
            return Err(PgMiddlewareError::type_mismatch(
                tag,
                "NULL payload; use TypedValue::null for a nullable value",
            ));
        }
        validate::check(tag, &raw)?;
        Ok(Self {
            tag,
            raw,
            nullable: false,
        })
    }

    /// A SQL NULL carrying a type tag.
    #[must_use]
    pub fn null(tag: TypeTag) -> Self {
        Self {
            tag,
            raw: RawValue::Null,
            nullable: true,
        }
    }

    /// Construct a value that may be NULL.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if a present payload does not fit the tag.
    pub fn nullable(tag: TypeTag, raw: Option<RawValue>) -> Result<Self, PgMiddlewareError> {
        match raw {
            None | Some(RawValue::Null) => Ok(Self::null(tag)),
            Some(raw) => {
                let mut value = Self::new(tag, raw)?;
                value.nullable = true;
                Ok(value)
            }
        }
    }

    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    #[must_use]
    pub fn raw(&self) -> &RawValue {
        &self.raw
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.raw, RawValue::Null)
    }

    /// Server type name for `Custom` and `Enum` values.
    #[must_use]
    pub fn user_type_name(&self) -> Option<&str> {
        if !self.tag.is_user_defined() {
            return None;
        }
        self.raw.as_list().and_then(|l| l.first()).and_then(RawValue::as_text)
    }

    /// Label of an `Enum` value.
    #[must_use]
    pub fn enum_label(&self) -> Option<&str> {
        if self.tag != TypeTag::Enum {
            return None;
        }
        self.raw.as_list().and_then(|l| l.get(1)).and_then(RawValue::as_text)
    }

    /// Render the payload in PostgreSQL's text input syntax. `None` for NULL.
    #[must_use]
    pub fn to_pg_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        Some(text::render(self.tag, &self.raw))
    }

    /// Decode a result cell into the requested tag.
    ///
    /// Cells that already carry the tag pass through; plain cells are lifted
    /// into a payload and validated.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if the cell cannot represent `tag`.
    pub fn coerce(tag: TypeTag, cell: &RowValues) -> Result<Self, PgMiddlewareError> {
        let raw = match cell {
            RowValues::Null => return Ok(Self::null(tag)),
            RowValues::Typed(tv) if tv.tag == tag => return Ok(tv.clone()),
            RowValues::Typed(tv) => {
                // A value read under another tag can still satisfy this one
                // through its text form (e.g. cidr read back as inet).
                match tv.to_pg_text() {
                    Some(text) => RawValue::Text(text),
                    None => return Ok(Self::null(tag)),
                }
            }
            RowValues::Int(i) => RawValue::Int(*i),
            RowValues::Float(f) => RawValue::Float(*f),
            RowValues::Text(s) => RawValue::Text(s.clone()),
            RowValues::JSON(v) => RawValue::Json(v.clone()),
            RowValues::Blob(b) => RawValue::Bytes(b.clone()),
            RowValues::Bool(b) => RawValue::Bool(*b),
            other => {
                return Err(PgMiddlewareError::type_mismatch(
                    tag,
                    format!("cannot decode a {} cell", other.kind_name()),
                ));
            }
        };
        Self::new(tag, raw)
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if `addr` is not a valid inet value.
    pub fn inet(addr: &str) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Inet, addr.into())
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if `network` is not in CIDR notation.
    pub fn cidr(network: &str) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Cidr, network.into())
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if `mac` is not six hex octets.
    pub fn macaddr(mac: &str) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::MacAddr, mac.into())
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` for non-finite coordinates.
    pub fn point(x: f64, y: f64) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Point, vec![x, y].into())
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if `uuid` is not a UUID string.
    pub fn uuid(uuid: &str) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Uuid, uuid.into())
    }

    /// # Errors
    /// Never fails for a `serde_json::Value`; the signature matches the other constructors.
    pub fn jsonb(value: JsonValue) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Jsonb, RawValue::Json(value))
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if either part is empty.
    pub fn enum_value(type_name: &str, label: &str) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Enum, vec![type_name, label].into())
    }

    /// # Errors
    /// Returns `PgMiddlewareError::TypeMismatch` if either part is empty.
    pub fn custom(type_name: &str, text: &str) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Custom, vec![type_name, text].into())
    }

    /// Money in integer cents.
    ///
    /// # Errors
    /// Never fails for integer cents; the signature matches the other constructors.
    pub fn money_cents(cents: i64) -> Result<Self, PgMiddlewareError> {
        Self::new(TypeTag::Money, RawValue::Int(cents))
    }
}

impl std::fmt::Display for TypedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_pg_text() {
            Some(text) => write!(f, "{text}::{}", self.user_type_name().unwrap_or(self.tag.pg_name())),
            None => write!(f, "NULL::{}", self.tag),
        }
    }
}
