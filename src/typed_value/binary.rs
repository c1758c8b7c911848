//! Binary send/recv codecs for domain types.
//!
//! Parameters use the binary format only for tags whose declaration says so;
//! result columns always arrive in binary and are decoded here.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use super::{RawValue, TypeTag, TypedValue};
use crate::error::PgMiddlewareError;

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Encode a non-null value in binary format.
///
/// # Errors
/// Returns `PgMiddlewareError::TypeMismatch` if the tag has no binary codec or
/// the payload cannot be represented.
pub fn encode_binary(value: &TypedValue, out: &mut Vec<u8>) -> Result<(), PgMiddlewareError> {
    let tag = value.tag();
    let fail = |msg: &str| PgMiddlewareError::type_mismatch(tag, msg);
    match (tag, value.raw()) {
        (TypeTag::Uuid, RawValue::Text(s)) => {
            let hex: String = s.chars().filter(char::is_ascii_hexdigit).collect();
            if hex.len() != 32 {
                return Err(fail("UUID must have 32 hex digits"));
            }
            for i in 0..16 {
                let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                    .map_err(|_| fail("UUID contains a non-hex digit"))?;
                out.push(byte);
            }
        }
        (TypeTag::Point, RawValue::List(items)) => {
            for item in items {
                let n = item.as_number().ok_or_else(|| fail("coordinate is not numeric"))?;
                out.extend_from_slice(&n.to_be_bytes());
            }
        }
        (TypeTag::Money, RawValue::Int(cents)) => out.extend_from_slice(&cents.to_be_bytes()),
        (TypeTag::Oid, RawValue::Int(oid)) => {
            let oid = u32::try_from(*oid).map_err(|_| fail("OID out of range"))?;
            out.extend_from_slice(&oid.to_be_bytes());
        }
        (TypeTag::Json, RawValue::Json(v)) => out.extend_from_slice(v.to_string().as_bytes()),
        (TypeTag::Json, RawValue::Text(s)) => out.extend_from_slice(s.as_bytes()),
        (TypeTag::Jsonb, RawValue::Json(v)) => {
            out.push(1);
            out.extend_from_slice(v.to_string().as_bytes());
        }
        (TypeTag::Jsonb, RawValue::Text(s)) => {
            out.push(1);
            out.extend_from_slice(s.as_bytes());
        }
        _ => return Err(fail("no binary encoding for this payload")),
    }
    Ok(())
}

/// Whether `value` can be sent in binary format.
#[must_use]
pub(crate) fn can_encode_binary(value: &TypedValue) -> bool {
    value.tag().supports_binary()
        && match (value.tag(), value.raw()) {
            (TypeTag::Money, raw) => matches!(raw, RawValue::Int(_)),
            (TypeTag::Uuid | TypeTag::Point | TypeTag::Oid, _) => true,
            (TypeTag::Json | TypeTag::Jsonb, raw) => {
                matches!(raw, RawValue::Json(_) | RawValue::Text(_))
            }
            _ => false,
        }
}

/// Decode a binary result cell of a domain type.
///
/// `user_type` names the server type for `Custom` and `Enum` columns.
///
/// # Errors
/// Returns `PgMiddlewareError::TypeMismatch` if the bytes are truncated or the
/// tag's binary format is not supported.
pub fn decode_binary(
    tag: TypeTag,
    user_type: Option<&str>,
    bytes: &[u8],
) -> Result<TypedValue, PgMiddlewareError> {
    let raw = decode_raw(tag, user_type, bytes)
        .map_err(|reason| PgMiddlewareError::type_mismatch(tag, format!("binary decode: {reason}")))?;
    TypedValue::new(tag, raw)
}

type Decoded<T> = Result<T, &'static str>;

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Decoded<&'a [u8]> {
        if self.buf.len() < n {
            return Err("payload is truncated");
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Decoded<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Decoded<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Decoded<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Decoded<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> Decoded<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Decoded<i64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    fn f64(&mut self) -> Decoded<f64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(f64::from_be_bytes(arr))
    }

    fn point(&mut self) -> Decoded<RawValue> {
        Ok(RawValue::from(vec![self.f64()?, self.f64()?]))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn finish(&self) -> Decoded<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err("trailing bytes")
        }
    }
}

fn utf8(bytes: &[u8]) -> Decoded<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| "payload is not UTF-8")
}

fn decode_raw(tag: TypeTag, user_type: Option<&str>, bytes: &[u8]) -> Decoded<RawValue> {
    let mut r = Reader { buf: bytes };
    let raw = match tag {
        TypeTag::Inet | TypeTag::Cidr => RawValue::Text(decode_inet(&mut r, tag == TypeTag::Inet)?),
        TypeTag::MacAddr | TypeTag::MacAddr8 => {
            let len = if tag == TypeTag::MacAddr { 6 } else { 8 };
            let octets = r.take(len)?;
            RawValue::Text(
                octets
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(":"),
            )
        }
        TypeTag::Point => r.point()?,
        TypeTag::Line => RawValue::from(vec![r.f64()?, r.f64()?, r.f64()?]),
        TypeTag::LineSegment | TypeTag::Box => RawValue::List(vec![r.point()?, r.point()?]),
        TypeTag::Polygon => {
            let n = usize::try_from(r.i32()?).map_err(|_| "negative point count")?;
            // The count comes off the wire; each point is 16 bytes.
            let mut pts = Vec::with_capacity(n.min(r.buf.len() / 16));
            for _ in 0..n {
                pts.push(r.point()?);
            }
            RawValue::List(pts)
        }
        TypeTag::Circle => {
            let center = r.point()?;
            RawValue::List(vec![center, RawValue::Float(r.f64()?)])
        }
        TypeTag::Uuid => {
            let b = r.take(16)?;
            let hex: String = b.iter().map(|x| format!("{x:02x}")).collect();
            RawValue::Text(format!(
                "{}-{}-{}-{}-{}",
                &hex[0..8],
                &hex[8..12],
                &hex[12..16],
                &hex[16..20],
                &hex[20..32]
            ))
        }
        TypeTag::Json | TypeTag::Jsonb => {
            if tag == TypeTag::Jsonb && r.u8()? != 1 {
                return Err("unsupported jsonb version");
            }
            let text = utf8(r.rest())?;
            RawValue::Json(serde_json::from_str(&text).map_err(|_| "payload is not JSON")?)
        }
        TypeTag::Interval => {
            let micros = r.i64()?;
            let days = r.i32()?;
            let months = r.i32()?;
            RawValue::List(vec![
                RawValue::Int(i64::from(months)),
                RawValue::Int(i64::from(days)),
                RawValue::Int(micros),
            ])
        }
        TypeTag::Int4Range
        | TypeTag::Int8Range
        | TypeTag::NumRange
        | TypeTag::TsRange
        | TypeTag::TsTzRange
        | TypeTag::DateRange => RawValue::Text(decode_range(&mut r, tag)?),
        TypeTag::Bit | TypeTag::VarBit => {
            let len = usize::try_from(r.i32()?).map_err(|_| "negative bit length")?;
            let data = r.rest();
            if data.len() * 8 < len {
                return Err("bit string is truncated");
            }
            let bits: String = (0..len)
                .map(|i| if data[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
                .collect();
            RawValue::Text(bits)
        }
        TypeTag::Money => RawValue::Int(r.i64()?),
        TypeTag::Oid
        | TypeTag::RegClass
        | TypeTag::RegType
        | TypeTag::RegProc
        | TypeTag::RegProcedure
        | TypeTag::RegNamespace
        | TypeTag::RegRole
        | TypeTag::RegConfig => RawValue::Int(i64::from(r.u32()?)),
        TypeTag::Xml => RawValue::Text(utf8(r.rest())?),
        TypeTag::TsVector | TypeTag::TsQuery => {
            return Err("binary text-search values are not supported");
        }
        TypeTag::Custom | TypeTag::Enum => {
            let name = user_type.ok_or("user-defined type name is unknown")?;
            RawValue::from(vec![name.to_string(), utf8(r.rest())?])
        }
    };
    r.finish()?;
    Ok(raw)
}

fn decode_inet(r: &mut Reader<'_>, is_inet: bool) -> Decoded<String> {
    let family = r.u8()?;
    let bits = r.u8()?;
    let _is_cidr = r.u8()?;
    let len = r.u8()?;
    let addr = r.take(usize::from(len))?;
    let (text, width) = match (family, addr.len()) {
        (2, 4) => (
            std::net::Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]).to_string(),
            32,
        ),
        (3, 16) => {
            let mut arr = [0u8; 16];
            arr.copy_from_slice(addr);
            (std::net::Ipv6Addr::from(arr).to_string(), 128)
        }
        _ => return Err("unknown address family"),
    };
    if is_inet && bits == width {
        Ok(text)
    } else {
        Ok(format!("{text}/{bits}"))
    }
}

fn decode_range(r: &mut Reader<'_>, tag: TypeTag) -> Decoded<String> {
    let flags = r.u8()?;
    if flags & RANGE_EMPTY != 0 {
        return Ok("empty".to_string());
    }
    let mut bound = |infinite: bool| -> Decoded<String> {
        if infinite {
            return Ok(String::new());
        }
        let len = usize::try_from(r.i32()?).map_err(|_| "negative bound length")?;
        let data = r.take(len)?;
        decode_range_bound(tag, data)
    };
    let lower = bound(flags & RANGE_LB_INF != 0)?;
    let upper = bound(flags & RANGE_UB_INF != 0)?;
    let open = if flags & RANGE_LB_INC != 0 { '[' } else { '(' };
    let close = if flags & RANGE_UB_INC != 0 { ']' } else { ')' };
    Ok(format!("{open}{lower},{upper}{close}"))
}

fn decode_range_bound(tag: TypeTag, data: &[u8]) -> Decoded<String> {
    let mut r = Reader { buf: data };
    let text = match tag {
        TypeTag::Int4Range => r.i32()?.to_string(),
        TypeTag::Int8Range => r.i64()?.to_string(),
        TypeTag::NumRange => decode_numeric(r.rest())?,
        TypeTag::DateRange => decode_date(r.i32()?)?,
        TypeTag::TsRange => format!("\"{}\"", decode_timestamp(r.i64()?)?),
        TypeTag::TsTzRange => {
            let ts = decode_timestamp(r.i64()?)?;
            if ts.ends_with("infinity") {
                format!("\"{ts}\"")
            } else {
                format!("\"{ts}+00\"")
            }
        }
        _ => return Err("not a range type"),
    };
    r.finish()?;
    Ok(text)
}

fn pg_epoch() -> NaiveDateTime {
    DateTime::from_timestamp(946_684_800, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

fn decode_date(days: i32) -> Decoded<String> {
    match days {
        i32::MAX => return Ok("infinity".to_string()),
        i32::MIN => return Ok("-infinity".to_string()),
        _ => {}
    }
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).ok_or("bad epoch")?;
    epoch
        .checked_add_signed(Duration::days(i64::from(days)))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or("date out of range")
}

fn decode_timestamp(micros: i64) -> Decoded<String> {
    match micros {
        i64::MAX => return Ok("infinity".to_string()),
        i64::MIN => return Ok("-infinity".to_string()),
        _ => {}
    }
    pg_epoch()
        .checked_add_signed(Duration::microseconds(micros))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        .ok_or("timestamp out of range")
}

/// Decode a binary `numeric` into its decimal text form.
pub(crate) fn decode_numeric(bytes: &[u8]) -> Result<String, &'static str> {
    let mut r = Reader { buf: bytes };
    let ndigits = usize::try_from(r.i16()?).map_err(|_| "negative digit count")?;
    let weight = i32::from(r.i16()?);
    let sign = r.u16()?;
    let dscale = usize::try_from(r.i16()?).map_err(|_| "negative scale")?;
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let mut digits = Vec::with_capacity(ndigits.min(r.buf.len() / 2));
    for _ in 0..ndigits {
        digits.push(r.i16()?);
    }
    r.finish()?;

    // Each base-10000 digit covers four decimal places; `weight` is the index
    // of the first digit relative to the decimal point.
    let mut int_part = String::new();
    for i in 0..=weight.max(-1) {
        let idx = usize::try_from(i).map_err(|_| "bad weight")?;
        let d = digits.get(idx).copied().unwrap_or(0);
        if int_part.is_empty() {
            if d != 0 {
                int_part.push_str(&d.to_string());
            }
        } else {
            int_part.push_str(&format!("{d:04}"));
        }
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let mut frac_part = String::new();
    if dscale > 0 {
        let mut i = weight + 1;
        while frac_part.len() < dscale {
            let d = if i < 0 {
                0
            } else {
                usize::try_from(i)
                    .ok()
                    .and_then(|idx| digits.get(idx).copied())
                    .unwrap_or(0)
            };
            frac_part.push_str(&format!("{d:04}"));
            i += 1;
        }
        frac_part.truncate(dscale);
    }

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    out.push_str(&int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(&frac_part);
    }
    Ok(out)
}
