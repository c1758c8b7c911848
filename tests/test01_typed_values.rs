use pg_middleware::prelude::*;
use pg_middleware::typed_value::{DECLARATIONS, decode_binary, encode_binary};
use serde_json::json;

#[test]
fn test01_every_tag_is_declared_once() {
    assert_eq!(DECLARATIONS.len(), 36);
    for decl in &DECLARATIONS {
        assert_eq!(decl.tag.pg_name(), decl.pg_name);
        if let Some(oid) = decl.oid {
            assert_eq!(TypeTag::from_oid(oid), Some(decl.tag));
        }
        assert!(!decl.constraint.is_empty());
    }
    assert!(TypeTag::Custom.is_user_defined());
    assert!(TypeTag::Enum.is_user_defined());
    assert!(!TypeTag::Inet.is_user_defined());
}

#[test]
fn test01_constructors_validate_payload_shape() -> Result<(), PgMiddlewareError> {
    let addr = TypedValue::inet("192.168.1.1")?;
    assert_eq!(addr.tag(), TypeTag::Inet);
    assert_eq!(addr.to_pg_text().as_deref(), Some("192.168.1.1"));

    assert!(matches!(
        TypedValue::inet("not an address"),
        Err(PgMiddlewareError::TypeMismatch { .. })
    ));
    assert!(matches!(
        TypedValue::cidr("10.0.0.1/8"),
        Err(PgMiddlewareError::TypeMismatch { .. })
    ));
    assert!(matches!(
        TypedValue::new(TypeTag::Point, vec![1.0, 2.0, 3.0].into()),
        Err(PgMiddlewareError::TypeMismatch { .. })
    ));

    let mood = TypedValue::enum_value("mood", "happy")?;
    assert_eq!(mood.user_type_name(), Some("mood"));
    assert_eq!(mood.enum_label(), Some("happy"));
    assert_eq!(mood.to_string(), "happy::mood");
    Ok(())
}

#[test]
fn test01_null_needs_explicit_construction() -> Result<(), PgMiddlewareError> {
    assert!(TypedValue::new(TypeTag::Uuid, RawValue::Null).is_err());

    let null = TypedValue::null(TypeTag::Uuid);
    assert!(null.is_null());
    assert!(null.is_nullable());
    assert_eq!(null.to_pg_text(), None);

    let maybe = TypedValue::nullable(TypeTag::Money, Some(RawValue::Int(250)))?;
    assert!(maybe.is_nullable());
    assert_eq!(maybe.to_pg_text().as_deref(), Some("2.50"));
    Ok(())
}

#[test]
fn test01_coerce_lifts_plain_cells() -> Result<(), PgMiddlewareError> {
    let v = TypedValue::coerce(TypeTag::Inet, &RowValues::Text("10.1.2.3".into()))?;
    assert_eq!(v.raw().as_text(), Some("10.1.2.3"));

    let v = TypedValue::coerce(TypeTag::Jsonb, &RowValues::JSON(json!({"a": 1})))?;
    assert_eq!(v.raw(), &RawValue::Json(json!({"a": 1})));

    // A cidr read back can satisfy an inet slot through its text form.
    let cidr = RowValues::Typed(TypedValue::cidr("10.0.0.0/8")?);
    let v = TypedValue::coerce(TypeTag::Inet, &cidr)?;
    assert_eq!(v.tag(), TypeTag::Inet);

    assert!(TypedValue::coerce(TypeTag::Point, &RowValues::Text("oops".into())).is_err());
    assert!(TypedValue::coerce(TypeTag::Uuid, &RowValues::Null)?.is_null());
    Ok(())
}

#[test]
fn test01_binary_codecs_agree() -> Result<(), PgMiddlewareError> {
    let uuid = TypedValue::uuid("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")?;
    let mut buf = Vec::new();
    encode_binary(&uuid, &mut buf)?;
    assert_eq!(buf.len(), 16);
    let back = decode_binary(TypeTag::Uuid, None, &buf)?;
    assert_eq!(back.raw().as_text(), Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"));

    let point = TypedValue::point(1.5, -2.0)?;
    let mut buf = Vec::new();
    encode_binary(&point, &mut buf)?;
    let back = decode_binary(TypeTag::Point, None, &buf)?;
    assert_eq!(back.to_pg_text().as_deref(), Some("(1.5,-2)"));

    assert!(matches!(
        decode_binary(TypeTag::Point, None, &buf[..7]),
        Err(PgMiddlewareError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test01_tags_parse_from_cli_names() {
    use clap::ValueEnum;
    let tag = TypeTag::from_str("inet", true);
    assert_eq!(tag, Ok(TypeTag::Inet));
    assert_eq!(TypeTag::from_pg_name("tstzrange"), Some(TypeTag::TsTzRange));
    assert_eq!(TypeTag::from_pg_name("enum"), None);
}
