use std::sync::Arc;

use tracing::debug;

use super::ParameterizedQuery;
use crate::typed_value::can_encode_binary;
use crate::types::{ParamType, RowValues, WireFormat};

/// Knobs that influence how parameters are declared and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOptions {
    /// Send typed values with a binary codec in binary format.
    pub binary_transfer: bool,
    /// Declare the default PostgreSQL type of plain parameters instead of
    /// letting the server infer it from context.
    pub infer_plain_types: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            binary_transfer: true,
            infer_plain_types: true,
        }
    }
}

/// One parameter ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub value: RowValues,
    /// Type declared when the statement is prepared.
    pub hint: ParamType,
    pub format: WireFormat,
}

/// A statement ready for the driver: `$N` SQL plus typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: Arc<str>,
    pub params: Vec<BoundParam>,
    /// The statement ends in `RETURNING` and yields generated keys.
    pub returning: bool,
}

impl BoundStatement {
    #[must_use]
    pub fn param_values(&self) -> Vec<&RowValues> {
        self.params.iter().map(|p| &p.value).collect()
    }
}

/// Turns a [`ParameterizedQuery`] into a [`BoundStatement`].
pub struct Binder;

impl Binder {
    /// Bind `query` with `options`. Pure; the same query may be bound any
    /// number of times.
    #[must_use]
    pub fn bind(query: &ParameterizedQuery, options: &BindOptions) -> BoundStatement {
        let sql = match query.generated_keys() {
            Some(cols) => {
                let (code, tail) = query.template().split_code();
                let tail = tail.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
                let mut sql = format!("{code} RETURNING {}", cols.join(", "));
                if !tail.is_empty() {
                    sql.push(' ');
                    sql.push_str(tail);
                }
                Arc::from(sql)
            }
            None => query.template().shared_sql(),
        };
        let params = query
            .params()
            .iter()
            .map(|value| bind_param(value, options))
            .collect::<Vec<_>>();
        debug!(sql = %sql, params = params.len(), "bound statement");
        BoundStatement {
            sql,
            params,
            returning: query.generated_keys().is_some(),
        }
    }
}

fn bind_param(value: &RowValues, options: &BindOptions) -> BoundParam {
    match value {
        RowValues::Typed(tv) => {
            let binary = options.binary_transfer && !tv.is_null() && can_encode_binary(tv);
            BoundParam {
                value: value.clone(),
                hint: ParamType::for_tag(tv.tag(), tv.user_type_name()),
                format: if binary {
                    WireFormat::Binary
                } else {
                    WireFormat::Text
                },
            }
        }
        plain => BoundParam {
            value: plain.clone(),
            hint: if options.infer_plain_types {
                ParamType::for_value(plain)
            } else {
                ParamType::unspecified()
            },
            format: WireFormat::Binary,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_value::{TypeTag, TypedValue};

    fn query(params: Vec<RowValues>) -> ParameterizedQuery {
        ParameterizedQuery::new("INSERT INTO t(a,b) VALUES ($1,$2)", params).unwrap()
    }

    #[test]
    fn attaches_type_hints() {
        let q = query(vec![
            RowValues::Int(42),
            TypedValue::inet("192.168.1.1").unwrap().into(),
        ]);
        let bound = Binder::bind(&q, &BindOptions::default());
        assert_eq!(&*bound.sql, "INSERT INTO t(a,b) VALUES ($1,$2)");
        assert_eq!(bound.params[0].hint.name, "int8");
        assert_eq!(bound.params[1].hint.oid, Some(869));
        // inet has no binary codec
        assert_eq!(bound.params[1].format, WireFormat::Text);
    }

    #[test]
    fn binary_transfer_applies_to_supported_tags() {
        let uuid = TypedValue::uuid("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap();
        let q = query(vec![uuid.into(), RowValues::Null]);
        let on = Binder::bind(&q, &BindOptions::default());
        assert_eq!(on.params[0].format, WireFormat::Binary);
        assert!(on.params[1].hint.is_unspecified());

        let off = Binder::bind(
            &q,
            &BindOptions {
                binary_transfer: false,
                infer_plain_types: true,
            },
        );
        assert_eq!(off.params[0].format, WireFormat::Text);
    }

    #[test]
    fn plain_types_can_be_left_to_the_server() {
        let q = query(vec!["x".into(), TypedValue::null(TypeTag::Cidr).into()]);
        let bound = Binder::bind(
            &q,
            &BindOptions {
                binary_transfer: true,
                infer_plain_types: false,
            },
        );
        assert!(bound.params[0].hint.is_unspecified());
        assert_eq!(bound.params[1].hint.name, "cidr");
    }

    #[test]
    fn binding_is_repeatable() {
        let q = query(vec![1.into(), 2.into()]);
        let opts = BindOptions::default();
        assert_eq!(Binder::bind(&q, &opts), Binder::bind(&q, &opts));
    }

    #[test]
    fn generated_keys_append_returning() {
        let q = query(vec![1.into(), 2.into()])
            .with_generated_keys(&["id"])
            .unwrap();
        let bound = Binder::bind(&q, &BindOptions::default());
        assert_eq!(&*bound.sql, "INSERT INTO t(a,b) VALUES ($1,$2) RETURNING id");
        assert!(bound.returning);
    }

    #[test]
    fn returning_goes_before_trailing_comments() {
        let q = ParameterizedQuery::new("INSERT INTO t(a) VALUES (?) -- audit", vec![1.into()])
            .unwrap()
            .with_generated_keys(&["id"])
            .unwrap();
        let bound = Binder::bind(&q, &BindOptions::default());
        assert_eq!(&*bound.sql, "INSERT INTO t(a) VALUES ($1) RETURNING id -- audit");

        let q = ParameterizedQuery::new(
            "INSERT INTO t(a) VALUES ('--') /* one */;\n-- two",
            vec![],
        )
        .unwrap()
        .with_generated_keys(&["id", "a"])
        .unwrap();
        let bound = Binder::bind(&q, &BindOptions::default());
        assert_eq!(
            &*bound.sql,
            "INSERT INTO t(a) VALUES ('--') RETURNING id, a /* one */;\n-- two"
        );
    }
}
