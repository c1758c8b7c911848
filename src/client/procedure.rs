use crate::driver::PoolBackend;
use crate::error::PgMiddlewareError;
use crate::query::ParameterizedQuery;
use crate::results::CustomDbRow;
use crate::typed_value::{RawValue, TypeTag, TypedValue};
use crate::types::RowValues;

use super::RowStream;

/// How a routine is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    /// `CALL name(...)`; OUT slots are passed as typed NULLs.
    Procedure,
    /// `SELECT * FROM name(...)`; OUT slots are not passed.
    Function,
}

/// One argument slot of a routine call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureArg {
    In(RowValues),
    Out(OutSlot),
    InOut(RowValues, OutSlot),
}

/// Declared type of an OUT slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutSlot {
    pub tag: TypeTag,
    /// Server type name for `Custom` and `Enum` slots.
    pub type_name: Option<String>,
}

impl OutSlot {
    fn sql_type(&self) -> &str {
        self.type_name.as_deref().unwrap_or(self.tag.pg_name())
    }
}

/// A stored procedure or function invocation.
///
/// ```rust
/// use pg_middleware::prelude::*;
///
/// let call = ProcedureCall::procedure("net.assign_address")?
///     .input(RowValues::Int(7))
///     .output(TypeTag::Inet)
///     .output(TypeTag::Cidr);
/// let q = call.to_query()?;
/// assert_eq!(q.template().sql(), "CALL net.assign_address($1, NULL::inet, NULL::cidr)");
/// # Ok::<(), PgMiddlewareError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    name: String,
    kind: ProcedureKind,
    args: Vec<ProcedureArg>,
}

/// A decoded OUT value; failures are kept per slot.
#[derive(Debug)]
pub struct OutParam {
    /// Position of the slot among all arguments, from 0.
    pub position: usize,
    /// Result column the value was read from.
    pub name: Option<String>,
    pub value: Result<TypedValue, PgMiddlewareError>,
}

/// Rows and OUT values produced by a call.
#[derive(Debug)]
pub struct ProcedureResult<M: PoolBackend> {
    pub rows: Option<RowStream<M>>,
    pub out_params: Vec<OutParam>,
}

impl<M: PoolBackend> ProcedureResult<M> {
    /// The OUT value at argument `position`.
    #[must_use]
    pub fn out(&self, position: usize) -> Option<&Result<TypedValue, PgMiddlewareError>> {
        self.out_params
            .iter()
            .find(|p| p.position == position)
            .map(|p| &p.value)
    }
}

/// Re-tag a server failure as a failure of routine `name`; other errors pass
/// through.
pub(crate) fn routine_error(name: &str, err: PgMiddlewareError) -> PgMiddlewareError {
    match err {
        PgMiddlewareError::ExecutionError(_) => PgMiddlewareError::Procedure {
            procedure: name.to_string(),
            message: err.server_message(),
        },
        #[cfg(feature = "postgres")]
        PgMiddlewareError::PostgresError(_) => PgMiddlewareError::Procedure {
            procedure: name.to_string(),
            message: err.server_message(),
        },
        other => other,
    }
}

fn valid_routine_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            if let Some(inner) = part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
                !inner.is_empty() && !inner.contains('"')
            } else {
                !part.is_empty()
                    && !part.starts_with(|c: char| c.is_ascii_digit())
                    && part.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
            }
        })
}

impl ProcedureCall {
    /// # Errors
    /// Returns `ParameterError` if `name` is not a (schema-qualified) identifier.
    pub fn procedure(name: &str) -> Result<Self, PgMiddlewareError> {
        Self::with_kind(name, ProcedureKind::Procedure)
    }

    /// # Errors
    /// Returns `ParameterError` if `name` is not a (schema-qualified) identifier.
    pub fn function(name: &str) -> Result<Self, PgMiddlewareError> {
        Self::with_kind(name, ProcedureKind::Function)
    }

    fn with_kind(name: &str, kind: ProcedureKind) -> Result<Self, PgMiddlewareError> {
        if !valid_routine_name(name) {
            return Err(PgMiddlewareError::ParameterError(format!(
                "invalid routine name '{name}'"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            args: Vec::new(),
        })
    }

    #[must_use]
    pub fn input(mut self, value: impl Into<RowValues>) -> Self {
        self.args.push(ProcedureArg::In(value.into()));
        self
    }

    #[must_use]
    pub fn output(mut self, tag: TypeTag) -> Self {
        self.args.push(ProcedureArg::Out(OutSlot {
            tag,
            type_name: None,
        }));
        self
    }

    /// OUT slot of a user-defined type.
    #[must_use]
    pub fn output_user_type(mut self, tag: TypeTag, type_name: &str) -> Self {
        self.args.push(ProcedureArg::Out(OutSlot {
            tag,
            type_name: Some(type_name.to_string()),
        }));
        self
    }

    #[must_use]
    pub fn in_out(mut self, value: impl Into<RowValues>, tag: TypeTag) -> Self {
        let value = value.into();
        let type_name = value
            .as_typed()
            .and_then(TypedValue::user_type_name)
            .map(str::to_string);
        self.args
            .push(ProcedureArg::InOut(value, OutSlot { tag, type_name }));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    #[must_use]
    pub fn args(&self) -> &[ProcedureArg] {
        &self.args
    }

    /// OUT and INOUT slots with their argument positions, in call order.
    pub(crate) fn out_slots(&self) -> Vec<(usize, &OutSlot)> {
        self.args
            .iter()
            .enumerate()
            .filter_map(|(pos, arg)| match arg {
                ProcedureArg::Out(slot) | ProcedureArg::InOut(_, slot) => Some((pos, slot)),
                ProcedureArg::In(_) => None,
            })
            .collect()
    }

    /// Render the invocation statement.
    ///
    /// # Errors
    /// Returns `ParameterError` if a rendered placeholder is malformed.
    pub fn to_query(&self) -> Result<ParameterizedQuery, PgMiddlewareError> {
        let mut slots = Vec::with_capacity(self.args.len());
        let mut params = Vec::new();
        for arg in &self.args {
            match arg {
                ProcedureArg::In(value) | ProcedureArg::InOut(value, _) => {
                    params.push(value.clone());
                    slots.push(format!("${}", params.len()));
                }
                ProcedureArg::Out(slot) => {
                    if self.kind == ProcedureKind::Procedure {
                        slots.push(format!("NULL::{}", slot.sql_type()));
                    }
                }
            }
        }
        let sql = match self.kind {
            ProcedureKind::Procedure => format!("CALL {}({})", self.name, slots.join(", ")),
            ProcedureKind::Function => {
                format!("SELECT * FROM {}({})", self.name, slots.join(", "))
            }
        };
        ParameterizedQuery::new(&sql, params)
    }

    /// Decode the OUT slots from the first result row. OUT columns follow the
    /// slot order.
    pub(crate) fn decode_outs(&self, row: Option<&CustomDbRow>) -> Vec<OutParam> {
        self.out_slots()
            .into_iter()
            .enumerate()
            .map(|(column, (position, slot))| {
                let name = row.and_then(|r| r.column_names.get(column).cloned());
                let value = match row.map(|r| r.get_by_index(column)) {
                    None => Err(PgMiddlewareError::type_mismatch(
                        slot.tag,
                        "call returned no row for OUT values",
                    )),
                    Some(None) => Err(PgMiddlewareError::type_mismatch(
                        slot.tag,
                        format!("no result column for OUT slot {position}"),
                    )),
                    Some(Some(cell)) => decode_out(slot, cell),
                };
                OutParam {
                    position,
                    name,
                    value,
                }
            })
            .collect()
    }

    /// Out params for a call whose first row could not be read.
    pub(crate) fn failed_outs(&self, reason: &str) -> Vec<OutParam> {
        self.out_slots()
            .into_iter()
            .map(|(position, slot)| OutParam {
                position,
                name: None,
                value: Err(PgMiddlewareError::type_mismatch(slot.tag, reason.to_string())),
            })
            .collect()
    }
}

fn decode_out(slot: &OutSlot, cell: &RowValues) -> Result<TypedValue, PgMiddlewareError> {
    match (slot.tag.is_user_defined(), cell, &slot.type_name) {
        (true, RowValues::Text(text), Some(type_name)) => TypedValue::new(
            slot.tag,
            RawValue::from(vec![type_name.clone(), text.clone()]),
        ),
        _ => TypedValue::coerce(slot.tag, cell),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn function_calls_skip_out_slots() {
        let call = ProcedureCall::function("stats")
            .unwrap()
            .input("eth0")
            .output(TypeTag::Interval)
            .in_out(RowValues::Int(3), TypeTag::Oid);
        let q = call.to_query().unwrap();
        assert_eq!(q.template().sql(), "SELECT * FROM stats($1, $2)");
        assert_eq!(q.params().len(), 2);
        let slots: Vec<usize> = call.out_slots().into_iter().map(|(p, _)| p).collect();
        assert_eq!(slots, vec![1, 2]);
    }

    #[test]
    fn rejects_bad_names() {
        assert!(ProcedureCall::procedure("p; drop table x").is_err());
        assert!(ProcedureCall::procedure("").is_err());
        assert!(ProcedureCall::procedure("\"Odd Name\".proc").is_ok());
    }

    #[test]
    fn out_decoding_is_per_slot() {
        let call = ProcedureCall::procedure("p")
            .unwrap()
            .output(TypeTag::Inet)
            .output(TypeTag::Point)
            .output_user_type(TypeTag::Enum, "mood");
        let row = CustomDbRow::new(
            Arc::new(vec!["addr".into(), "loc".into(), "m".into()]),
            vec!["10.0.0.1".into(), "not a point".into(), "happy".into()],
        );
        let outs = call.decode_outs(Some(&row));
        assert_eq!(outs.len(), 3);
        assert_eq!(
            outs[0].value.as_ref().unwrap().raw().as_text(),
            Some("10.0.0.1")
        );
        assert!(matches!(
            outs[1].value,
            Err(PgMiddlewareError::TypeMismatch { .. })
        ));
        assert_eq!(outs[2].value.as_ref().unwrap().enum_label(), Some("happy"));
        assert_eq!(outs[2].name.as_deref(), Some("m"));
    }
}
