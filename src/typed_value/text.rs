use super::{RawValue, TypeTag};

/// Render a validated, non-null payload in PostgreSQL's text input syntax.
pub(super) fn render(tag: TypeTag, raw: &RawValue) -> String {
    match tag {
        TypeTag::Point => point(raw),
        TypeTag::Line => match raw.as_list() {
            Some(items) => format!(
                "{{{}}}",
                items.iter().map(number).collect::<Vec<_>>().join(",")
            ),
            None => scalar(raw),
        },
        TypeTag::LineSegment => format!("[{}]", point_list(raw)),
        TypeTag::Box => format!("({})", point_list(raw)),
        TypeTag::Polygon => format!("({})", point_list(raw)),
        TypeTag::Circle => match raw.as_list() {
            Some([center, radius]) => format!("<{},{}>", point(center), number(radius)),
            _ => scalar(raw),
        },
        TypeTag::Interval => match raw.as_list() {
            Some([months, days, micros]) => format!(
                "{} mons {} days {} microseconds",
                scalar(months),
                scalar(days),
                scalar(micros)
            ),
            _ => scalar(raw),
        },
        TypeTag::Money => match raw {
            RawValue::Int(cents) => cents_to_text(*cents),
            _ => scalar(raw),
        },
        TypeTag::Custom | TypeTag::Enum => match raw.as_list() {
            Some([_, value]) => scalar(value),
            _ => scalar(raw),
        },
        _ => scalar(raw),
    }
}

fn scalar(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => String::new(),
        RawValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        RawValue::Int(i) => i.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Text(s) => s.clone(),
        RawValue::Bytes(b) => {
            let mut out = String::with_capacity(2 + b.len() * 2);
            out.push_str("\\x");
            for byte in b {
                out.push_str(&format!("{byte:02x}"));
            }
            out
        }
        RawValue::List(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        RawValue::Json(v) => v.to_string(),
    }
}

fn number(raw: &RawValue) -> String {
    match raw {
        RawValue::Int(i) => i.to_string(),
        RawValue::Float(f) => f.to_string(),
        other => scalar(other),
    }
}

fn point(raw: &RawValue) -> String {
    match raw.as_list() {
        Some([x, y]) => format!("({},{})", number(x), number(y)),
        _ => scalar(raw),
    }
}

fn point_list(raw: &RawValue) -> String {
    raw.as_list()
        .map(|items| items.iter().map(point).collect::<Vec<_>>().join(","))
        .unwrap_or_default()
}

fn cents_to_text(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_value::TypedValue;

    fn text_of(tag: TypeTag, raw: RawValue) -> String {
        TypedValue::new(tag, raw).unwrap().to_pg_text().unwrap()
    }

    #[test]
    fn geometric_literals() {
        let p = |x: f64, y: f64| RawValue::from(vec![x, y]);
        assert_eq!(text_of(TypeTag::Point, p(1.5, -2.0)), "(1.5,-2)");
        assert_eq!(
            text_of(TypeTag::LineSegment, RawValue::List(vec![p(0.0, 0.0), p(1.0, 1.0)])),
            "[(0,0),(1,1)]"
        );
        assert_eq!(
            text_of(TypeTag::Box, RawValue::List(vec![p(1.0, 1.0), p(0.0, 0.0)])),
            "((1,1),(0,0))"
        );
        assert_eq!(
            text_of(TypeTag::Circle, RawValue::List(vec![p(0.0, 0.0), RawValue::Int(3)])),
            "<(0,0),3>"
        );
        assert_eq!(text_of(TypeTag::Line, vec![1.0, -1.0, 0.0].into()), "{1,-1,0}");
    }

    #[test]
    fn money_and_interval() {
        assert_eq!(text_of(TypeTag::Money, RawValue::Int(123_456)), "1234.56");
        assert_eq!(text_of(TypeTag::Money, RawValue::Int(-5)), "-0.05");
        assert_eq!(
            text_of(
                TypeTag::Interval,
                RawValue::List(vec![RawValue::Int(1), RawValue::Int(2), RawValue::Int(3)])
            ),
            "1 mons 2 days 3 microseconds"
        );
    }

    #[test]
    fn user_defined_types_render_their_value() {
        assert_eq!(text_of(TypeTag::Enum, vec!["mood", "happy"].into()), "happy");
        assert_eq!(text_of(TypeTag::Inet, "10.1.2.3".into()), "10.1.2.3");
    }
}
