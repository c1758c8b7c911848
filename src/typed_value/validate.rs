use std::net::IpAddr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

use super::{RawValue, RangeElement, TypeTag};
use crate::error::PgMiddlewareError;

lazy_static! {
    static ref MACADDR: Regex =
        Regex::new(r"^[0-9A-Fa-f]{2}([:-])[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){4}$").unwrap();
    static ref MACADDR8: Regex =
        Regex::new(r"^[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){7}$").unwrap();
    static ref UUID: Regex = Regex::new(
        r"^\{?[0-9A-Fa-f]{8}-?[0-9A-Fa-f]{4}-?[0-9A-Fa-f]{4}-?[0-9A-Fa-f]{4}-?[0-9A-Fa-f]{12}\}?$"
    )
    .unwrap();
    static ref MONEY: Regex = Regex::new(r"^-?\$?-?\d{1,3}(?:,?\d{3})*(?:\.\d+)?$").unwrap();
    static ref RANGE: Regex =
        Regex::new(r#"^([\[(])\s*("[^"]*"|[^,"]*?)\s*,\s*("[^"]*"|[^,"]*?)\s*([\])])$"#).unwrap();
    static ref REG_NAME: Regex = Regex::new(r"^\S.*$").unwrap();
}

/// Check `raw` against the structural constraint of `tag`. NULL payloads are
/// handled by the caller.
pub(super) fn check(tag: TypeTag, raw: &RawValue) -> Result<(), PgMiddlewareError> {
    let outcome = match tag {
        TypeTag::Inet => text(raw).and_then(|s| parse_inet(s, false)).map(|_| ()),
        TypeTag::Cidr => text(raw).and_then(|s| parse_inet(s, true)).map(|_| ()),
        TypeTag::MacAddr => text(raw).and_then(|s| matches(&MACADDR, s)),
        TypeTag::MacAddr8 => text(raw).and_then(|s| matches(&MACADDR8, s)),
        TypeTag::Point => point(raw).map(|_| ()),
        TypeTag::Line => line(raw),
        TypeTag::LineSegment | TypeTag::Box => points(raw, Some(2)),
        TypeTag::Polygon => points(raw, None),
        TypeTag::Circle => circle(raw),
        TypeTag::Uuid => text(raw).and_then(|s| matches(&UUID, s)),
        TypeTag::Json | TypeTag::Jsonb => json(raw),
        TypeTag::Interval => interval(raw),
        TypeTag::Int4Range
        | TypeTag::Int8Range
        | TypeTag::NumRange
        | TypeTag::TsRange
        | TypeTag::TsTzRange
        | TypeTag::DateRange => text(raw).and_then(|s| {
            // range_element is Some for every arm above
            let element = tag.range_element().ok_or("not a range tag")?;
            range(s, element)
        }),
        TypeTag::Bit => text(raw).and_then(|s| bits(s, false)),
        TypeTag::VarBit => text(raw).and_then(|s| bits(s, true)),
        TypeTag::Money => money(raw),
        TypeTag::Oid => oid(raw),
        TypeTag::RegClass
        | TypeTag::RegType
        | TypeTag::RegProc
        | TypeTag::RegProcedure
        | TypeTag::RegNamespace
        | TypeTag::RegRole
        | TypeTag::RegConfig => match raw {
            RawValue::Int(_) => oid(raw),
            _ => text(raw).and_then(|s| matches(&REG_NAME, s)),
        },
        TypeTag::Xml | TypeTag::TsVector | TypeTag::TsQuery => text(raw).and_then(non_empty),
        TypeTag::Custom | TypeTag::Enum => named_pair(raw),
    };

    outcome.map_err(|reason| {
        PgMiddlewareError::type_mismatch(
            tag,
            format!("{reason}; expected {}, got {}", tag.constraint(), raw.shape()),
        )
    })
}

type Check<T = ()> = Result<T, &'static str>;

fn text(raw: &RawValue) -> Check<&str> {
    raw.as_text().ok_or("payload is not text")
}

fn non_empty(s: &str) -> Check {
    if s.trim().is_empty() {
        Err("text is empty")
    } else {
        Ok(())
    }
}

fn matches(re: &Regex, s: &str) -> Check {
    if re.is_match(s) {
        Ok(())
    } else {
        Err("text is malformed")
    }
}

fn number(raw: &RawValue) -> Check<f64> {
    let n = raw.as_number().ok_or("coordinate is not numeric")?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err("coordinate is not finite")
    }
}

fn point(raw: &RawValue) -> Check<(f64, f64)> {
    match raw.as_list() {
        Some([x, y]) => Ok((number(x)?, number(y)?)),
        Some(_) => Err("point needs exactly two coordinates"),
        None => Err("point is not a list"),
    }
}

fn points(raw: &RawValue, exact: Option<usize>) -> Check {
    let items = raw.as_list().ok_or("payload is not a list of points")?;
    match exact {
        Some(n) if items.len() != n => return Err("wrong number of points"),
        None if items.is_empty() => return Err("no points"),
        _ => {}
    }
    for item in items {
        point(item)?;
    }
    Ok(())
}

fn line(raw: &RawValue) -> Check {
    match raw.as_list() {
        Some([a, b, c]) => {
            let (a, b) = (number(a)?, number(b)?);
            number(c)?;
            if a == 0.0 && b == 0.0 {
                Err("A and B are both zero")
            } else {
                Ok(())
            }
        }
        _ => Err("line needs three coefficients"),
    }
}

fn circle(raw: &RawValue) -> Check {
    match raw.as_list() {
        Some([center, radius]) => {
            point(center)?;
            if number(radius)? < 0.0 {
                Err("radius is negative")
            } else {
                Ok(())
            }
        }
        _ => Err("circle needs a center and a radius"),
    }
}

fn json(raw: &RawValue) -> Check {
    match raw {
        RawValue::Json(_) => Ok(()),
        RawValue::Text(s) => serde_json::from_str::<serde_json::Value>(s)
            .map(|_| ())
            .map_err(|_| "text is not valid JSON"),
        _ => Err("payload is not JSON"),
    }
}

fn interval(raw: &RawValue) -> Check {
    match raw {
        RawValue::Text(s) => non_empty(s),
        RawValue::List(items) => {
            if items.len() == 3 && items.iter().all(|i| matches!(i, RawValue::Int(_))) {
                Ok(())
            } else {
                Err("interval list needs three integers")
            }
        }
        _ => Err("payload is neither text nor a list"),
    }
}

fn bits(s: &str, allow_empty: bool) -> Check {
    if s.is_empty() && !allow_empty {
        return Err("bit string is empty");
    }
    if s.bytes().all(|b| b == b'0' || b == b'1') {
        Ok(())
    } else {
        Err("bit string contains characters other than 0 and 1")
    }
}

fn money(raw: &RawValue) -> Check {
    match raw {
        RawValue::Int(_) => Ok(()),
        RawValue::Float(f) if f.is_finite() => Ok(()),
        RawValue::Text(s) => matches(&MONEY, s.trim()),
        _ => Err("payload is not a monetary amount"),
    }
}

fn oid(raw: &RawValue) -> Check {
    match raw {
        RawValue::Int(i) if u32::try_from(*i).is_ok() => Ok(()),
        RawValue::Int(_) => Err("OID out of range"),
        _ => Err("payload is not an integer"),
    }
}

fn named_pair(raw: &RawValue) -> Check {
    match raw.as_list() {
        Some([RawValue::Text(name), RawValue::Text(value)]) => {
            non_empty(name)?;
            non_empty(value)
        }
        _ => Err("payload is not a [type name, value] pair"),
    }
}

pub(super) fn parse_inet(s: &str, require_prefix: bool) -> Check<(IpAddr, u8)> {
    let (addr_part, prefix_part) = match s.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (s, None),
    };
    let addr: IpAddr = addr_part.trim().parse().map_err(|_| "address is malformed")?;
    let width: u8 = if addr.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix_part {
        Some(p) => p.trim().parse::<u8>().map_err(|_| "prefix is not a number")?,
        None if require_prefix => return Err("network prefix is missing"),
        None => width,
    };
    if prefix > width {
        return Err("prefix is wider than the address");
    }
    if require_prefix && has_host_bits(addr, prefix) {
        return Err("address has bits set to the right of the mask");
    }
    Ok((addr, prefix))
}

fn has_host_bits(addr: IpAddr, prefix: u8) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let host_mask = u32::MAX.checked_shr(u32::from(prefix)).unwrap_or(0);
            bits & host_mask != 0
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let host_mask = u128::MAX.checked_shr(u32::from(prefix)).unwrap_or(0);
            bits & host_mask != 0
        }
    }
}

/// Split a range literal into its inclusive flags and raw bounds. Empty bounds
/// are unbounded.
pub(super) fn split_range(s: &str) -> Check<Option<(bool, &str, &str, bool)>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("empty") {
        return Ok(None);
    }
    let caps = RANGE.captures(s).ok_or("range literal is malformed")?;
    let lower_inc = caps.get(1).is_some_and(|m| m.as_str() == "[");
    let upper_inc = caps.get(4).is_some_and(|m| m.as_str() == "]");
    let lower = caps.get(2).map_or("", |m| m.as_str().trim_matches('"'));
    let upper = caps.get(3).map_or("", |m| m.as_str().trim_matches('"'));
    Ok(Some((lower_inc, lower, upper, upper_inc)))
}

fn range(s: &str, element: RangeElement) -> Check {
    let Some((_, lower, upper, _)) = split_range(s)? else {
        return Ok(());
    };
    let lo = bound(lower, element)?;
    let hi = bound(upper, element)?;
    if let (Some(lo), Some(hi)) = (lo, hi) {
        if lo > hi {
            return Err("range lower bound must be less than or equal to range upper bound");
        }
    }
    Ok(())
}

/// Ordering key of a range bound. Both bounds of one range share a variant.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum BoundKey {
    Int(i64),
    Numeric(f64),
}

/// Parse one range bound into an ordering key. `None` means unbounded.
fn bound(s: &str, element: RangeElement) -> Check<Option<BoundKey>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("infinity") || s.eq_ignore_ascii_case("-infinity") {
        return Ok(None);
    }
    let key = match element {
        RangeElement::Int4 => BoundKey::Int(
            s.parse::<i32>()
                .map(i64::from)
                .map_err(|_| "bound is not an int4")?,
        ),
        RangeElement::Int8 => BoundKey::Int(s.parse::<i64>().map_err(|_| "bound is not an int8")?),
        RangeElement::Numeric => {
            BoundKey::Numeric(s.parse::<f64>().map_err(|_| "bound is not numeric")?)
        }
        RangeElement::Timestamp => BoundKey::Int(
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map(|dt| dt.and_utc().timestamp_micros())
                .map_err(|_| "bound is not a timestamp")?,
        ),
        RangeElement::TimestampTz => BoundKey::Int(
            DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
                .or_else(|_| DateTime::parse_from_rfc3339(s))
                .map(|dt| dt.timestamp_micros())
                .map_err(|_| "bound is not a timestamptz")?,
        ),
        RangeElement::Date => BoundKey::Int(
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| i64::from(d.num_days_from_ce()))
                .map_err(|_| "bound is not a date")?,
        ),
    };
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(tag: TypeTag, raw: RawValue) {
        assert!(check(tag, &raw).is_ok(), "{tag} should accept {raw:?}");
    }

    fn bad(tag: TypeTag, raw: RawValue) {
        assert!(
            matches!(check(tag, &raw), Err(PgMiddlewareError::TypeMismatch { .. })),
            "{tag} should reject {raw:?}"
        );
    }

    #[test]
    fn network_types() {
        ok(TypeTag::Inet, "192.168.1.1".into());
        ok(TypeTag::Inet, "10.0.0.5/8".into());
        ok(TypeTag::Inet, "::1".into());
        bad(TypeTag::Inet, "300.1.1.1".into());
        bad(TypeTag::Inet, "10.0.0.1/33".into());

        ok(TypeTag::Cidr, "10.0.0.0/8".into());
        ok(TypeTag::Cidr, "2001:db8::/32".into());
        bad(TypeTag::Cidr, "10.0.0.0".into());
        bad(TypeTag::Cidr, "10.0.0.1/8".into());

        ok(TypeTag::MacAddr, "08:00:2b:01:02:03".into());
        ok(TypeTag::MacAddr, "08-00-2b-01-02-03".into());
        bad(TypeTag::MacAddr, "08:00:2b:01:02".into());
        ok(TypeTag::MacAddr8, "08:00:2b:01:02:03:04:05".into());
        bad(TypeTag::MacAddr8, "08:00:2b:01:02:03".into());
    }

    #[test]
    fn geometric_types() {
        ok(TypeTag::Point, vec![1.0, 2.0].into());
        ok(TypeTag::Point, RawValue::List(vec![RawValue::Int(1), RawValue::Float(2.5)]));
        bad(TypeTag::Point, vec![1.0, 2.0, 3.0].into());
        bad(TypeTag::Point, vec!["1", "2"].into());
        bad(TypeTag::Point, vec![f64::NAN, 1.0].into());

        ok(TypeTag::Line, vec![1.0, -1.0, 0.0].into());
        bad(TypeTag::Line, vec![0.0, 0.0, 1.0].into());

        let p = |x: f64, y: f64| RawValue::from(vec![x, y]);
        ok(TypeTag::LineSegment, RawValue::List(vec![p(0.0, 0.0), p(1.0, 1.0)]));
        bad(TypeTag::Box, RawValue::List(vec![p(0.0, 0.0)]));
        ok(TypeTag::Polygon, RawValue::List(vec![p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0)]));
        bad(TypeTag::Polygon, RawValue::List(vec![]));
        ok(TypeTag::Circle, RawValue::List(vec![p(0.0, 0.0), RawValue::Float(2.0)]));
        bad(TypeTag::Circle, RawValue::List(vec![p(0.0, 0.0), RawValue::Float(-2.0)]));
    }

    #[test]
    fn ranges() {
        ok(TypeTag::Int4Range, "[1,10)".into());
        ok(TypeTag::Int4Range, "(,5]".into());
        ok(TypeTag::Int4Range, "empty".into());
        bad(TypeTag::Int4Range, "[10,1)".into());
        bad(TypeTag::Int4Range, "[1.5,2)".into());
        bad(TypeTag::Int4Range, "1,2".into());
        ok(TypeTag::NumRange, "[1.5,2.25]".into());
        ok(TypeTag::DateRange, "[2024-01-01,2024-02-01)".into());
        bad(TypeTag::DateRange, "[2024-13-01,2024-02-01)".into());
        ok(TypeTag::TsRange, r#"["2024-01-01 10:00:00","2024-01-01 11:00:00")"#.into());
        ok(TypeTag::TsTzRange, r#"["2024-01-01 10:00:00+00","2024-01-01 11:00:00+00")"#.into());
    }

    #[test]
    fn int8_range_bounds_compare_exactly() {
        // Both bounds round to the same f64.
        bad(TypeTag::Int8Range, "[9007199254740993,9007199254740992]".into());
        ok(TypeTag::Int8Range, "[9007199254740992,9007199254740993]".into());
        ok(TypeTag::Int8Range, "[-9223372036854775808,9223372036854775807]".into());
        bad(TypeTag::TsRange, r#"["2024-01-01 10:00:00.000002","2024-01-01 10:00:00.000001")"#.into());
    }

    #[test]
    fn scalar_text_types() {
        ok(TypeTag::Uuid, "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into());
        ok(TypeTag::Uuid, "{a0eebc999c0b4ef8bb6d6bb9bd380a11}".into());
        bad(TypeTag::Uuid, "not-a-uuid".into());

        ok(TypeTag::Json, r#"{"a": 1}"#.into());
        bad(TypeTag::Jsonb, "{nope".into());

        ok(TypeTag::Bit, "1010".into());
        bad(TypeTag::Bit, "".into());
        ok(TypeTag::VarBit, "".into());
        bad(TypeTag::VarBit, "10a".into());

        ok(TypeTag::Money, RawValue::Int(1999));
        ok(TypeTag::Money, "$1,234.50".into());
        bad(TypeTag::Money, "twelve".into());

        ok(TypeTag::Oid, RawValue::Int(1259));
        bad(TypeTag::Oid, RawValue::Int(-1));
        ok(TypeTag::RegClass, "public.accounts".into());
        ok(TypeTag::RegType, RawValue::Int(23));
        bad(TypeTag::RegRole, "".into());

        ok(TypeTag::Interval, "1 day 02:00:00".into());
        ok(TypeTag::Interval, RawValue::List(vec![RawValue::Int(1), RawValue::Int(2), RawValue::Int(3)]));
        bad(TypeTag::Interval, RawValue::List(vec![RawValue::Int(1)]));
    }

    #[test]
    fn user_defined_types() {
        ok(TypeTag::Enum, vec!["mood", "happy"].into());
        bad(TypeTag::Enum, vec!["mood"].into());
        bad(TypeTag::Enum, vec!["", "happy"].into());
        ok(TypeTag::Custom, vec!["complex", "(1,2)"].into());
        bad(TypeTag::Custom, "complex".into());
    }
}
