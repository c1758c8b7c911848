use std::error::Error;

use chrono::{NaiveDateTime, NaiveTime};
use tokio_postgres::types::{Format, IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes::BytesMut;

use crate::query::BoundParam;
use crate::typed_value::{TypedValue, encode_binary};
use crate::types::{RowValues, WireFormat};

type EncodeResult = Result<IsNull, Box<dyn Error + Sync + Send>>;

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || ty.name() == "citext"
}

/// Whether a plain value has a native binary encoding for the type the server
/// resolved the parameter to. Everything else is sent in text input syntax.
fn plain_binary(value: &RowValues, ty: &Type) -> bool {
    match value {
        RowValues::Int(_) => matches!(
            *ty,
            Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8 | Type::OID
        ),
        RowValues::Float(_) => matches!(*ty, Type::FLOAT4 | Type::FLOAT8),
        RowValues::Text(_) => is_text_type(ty),
        RowValues::Bool(_) => *ty == Type::BOOL,
        RowValues::Timestamp(_) | RowValues::TimestampTz(_) | RowValues::Date(_) => {
            matches!(*ty, Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE)
        }
        RowValues::JSON(_) => matches!(*ty, Type::JSON | Type::JSONB),
        RowValues::Blob(_) => *ty == Type::BYTEA,
        RowValues::Null | RowValues::Typed(_) => true,
    }
}

/// Typed values go binary only when requested and the server agrees on the type.
fn typed_binary(param: &BoundParam, tv: &TypedValue, ty: &Type) -> bool {
    param.format == WireFormat::Binary && !tv.is_null() && tv.tag().oid() == Some(ty.oid())
}

fn plain_text(value: &RowValues) -> Option<String> {
    match value {
        RowValues::Int(i) => Some(i.to_string()),
        RowValues::Float(f) => Some(f.to_string()),
        RowValues::Text(s) => Some(s.clone()),
        RowValues::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
        RowValues::Timestamp(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        RowValues::TimestampTz(dt) => Some(dt.to_rfc3339()),
        RowValues::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        RowValues::JSON(v) => Some(v.to_string()),
        RowValues::Blob(bytes) => {
            let mut s = String::with_capacity(2 + bytes.len() * 2);
            s.push_str("\\x");
            for b in bytes {
                s.push_str(&format!("{b:02x}"));
            }
            Some(s)
        }
        RowValues::Null => None,
        RowValues::Typed(tv) => tv.to_pg_text(),
    }
}

fn encode_plain_binary(value: &RowValues, ty: &Type, out: &mut BytesMut) -> EncodeResult {
    match value {
        RowValues::Int(i) => match *ty {
            Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
            Type::OID => u32::try_from(*i)?.to_sql(ty, out),
            Type::FLOAT4 => (*i as f32).to_sql(ty, out),
            Type::FLOAT8 => (*i as f64).to_sql(ty, out),
            _ => i.to_sql(ty, out),
        },
        RowValues::Float(f) => match *ty {
            Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            _ => f.to_sql(ty, out),
        },
        RowValues::Text(s) => s.to_sql(ty, out),
        RowValues::Bool(b) => b.to_sql(ty, out),
        RowValues::Timestamp(dt) => match *ty {
            Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
            Type::DATE => dt.date().to_sql(ty, out),
            _ => dt.to_sql(ty, out),
        },
        RowValues::TimestampTz(dt) => match *ty {
            Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
            Type::DATE => dt.date_naive().to_sql(ty, out),
            _ => dt.to_sql(ty, out),
        },
        RowValues::Date(d) => match *ty {
            Type::TIMESTAMP => NaiveDateTime::new(*d, NaiveTime::MIN).to_sql(ty, out),
            Type::TIMESTAMPTZ => NaiveDateTime::new(*d, NaiveTime::MIN).and_utc().to_sql(ty, out),
            _ => d.to_sql(ty, out),
        },
        RowValues::JSON(v) => v.to_sql(ty, out),
        RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        RowValues::Null => Ok(IsNull::Yes),
        RowValues::Typed(_) => Err("typed value routed to the plain encoder".into()),
    }
}

fn write_text(text: Option<String>, out: &mut BytesMut) -> IsNull {
    match text {
        Some(text) => {
            out.extend_from_slice(text.as_bytes());
            IsNull::No
        }
        None => IsNull::Yes,
    }
}

impl ToSql for BoundParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        match &self.value {
            RowValues::Typed(tv) if typed_binary(self, tv, ty) => {
                let mut buf = Vec::new();
                encode_binary(tv, &mut buf)?;
                out.extend_from_slice(&buf);
                Ok(IsNull::No)
            }
            RowValues::Typed(tv) => Ok(write_text(tv.to_pg_text(), out)),
            value if plain_binary(value, ty) => encode_plain_binary(value, ty, out),
            value => Ok(write_text(plain_text(value), out)),
        }
    }

    // The server decides parameter types at prepare time; values adapt to it.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        let binary = match &self.value {
            RowValues::Typed(tv) => typed_binary(self, tv, ty),
            value => plain_binary(value, ty),
        };
        if binary { Format::Binary } else { Format::Text }
    }

    to_sql_checked!();
}
