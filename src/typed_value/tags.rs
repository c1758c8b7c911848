use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// PostgreSQL domain types that travel as [`TypedValue`](super::TypedValue)s.
///
/// The set is closed: each tag has one row in [`DECLARATIONS`] describing its
/// server type and structural constraint, and one validation rule in
/// `validate.rs`. Dispatch never branches on tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Inet,
    Cidr,
    MacAddr,
    MacAddr8,
    Point,
    Line,
    LineSegment,
    Box,
    Polygon,
    Circle,
    Uuid,
    Json,
    Jsonb,
    Interval,
    Int4Range,
    Int8Range,
    NumRange,
    TsRange,
    TsTzRange,
    DateRange,
    Bit,
    VarBit,
    Money,
    Oid,
    RegClass,
    RegType,
    RegProc,
    RegProcedure,
    RegNamespace,
    RegRole,
    RegConfig,
    Xml,
    TsVector,
    TsQuery,
    Custom,
    Enum,
}

/// Static description of one domain type.
#[derive(Debug)]
pub struct TagDecl {
    pub tag: TypeTag,
    /// Name PostgreSQL uses for the type (`pg_type.typname`).
    pub pg_name: &'static str,
    /// Builtin OID; `None` for user-defined types.
    pub oid: Option<u32>,
    /// Whether a binary send/recv codec exists for parameters of this type.
    pub binary: bool,
    /// Human-readable structural constraint on the raw payload.
    pub constraint: &'static str,
}

const fn decl(
    tag: TypeTag,
    pg_name: &'static str,
    oid: Option<u32>,
    binary: bool,
    constraint: &'static str,
) -> TagDecl {
    TagDecl {
        tag,
        pg_name,
        oid,
        binary,
        constraint,
    }
}

/// One row per [`TypeTag`], in declaration order.
pub static DECLARATIONS: [TagDecl; 36] = [
    decl(TypeTag::Inet, "inet", Some(869), false, "IPv4/IPv6 address text with optional /prefix"),
    decl(TypeTag::Cidr, "cidr", Some(650), false, "network address text with /prefix and no host bits set"),
    decl(TypeTag::MacAddr, "macaddr", Some(829), false, "six hex octets separated by ':' or '-'"),
    decl(TypeTag::MacAddr8, "macaddr8", Some(774), false, "eight hex octets separated by ':' or '-'"),
    decl(TypeTag::Point, "point", Some(600), true, "list of two numeric coordinates"),
    decl(TypeTag::Line, "line", Some(628), false, "list of three numerics {A,B,C}, A and B not both zero"),
    decl(TypeTag::LineSegment, "lseg", Some(601), false, "list of two points"),
    decl(TypeTag::Box, "box", Some(603), false, "list of two corner points"),
    decl(TypeTag::Polygon, "polygon", Some(604), false, "list of one or more points"),
    decl(TypeTag::Circle, "circle", Some(718), false, "list of [center point, radius >= 0]"),
    decl(TypeTag::Uuid, "uuid", Some(2950), true, "UUID text (32 hex digits, optionally hyphenated or braced)"),
    decl(TypeTag::Json, "json", Some(114), true, "JSON value or text that parses as JSON"),
    decl(TypeTag::Jsonb, "jsonb", Some(3802), true, "JSON value or text that parses as JSON"),
    decl(TypeTag::Interval, "interval", Some(1186), false, "non-empty interval text or [months, days, microseconds]"),
    decl(TypeTag::Int4Range, "int4range", Some(3904), false, "range literal with int4 bounds"),
    decl(TypeTag::Int8Range, "int8range", Some(3926), false, "range literal with int8 bounds"),
    decl(TypeTag::NumRange, "numrange", Some(3906), false, "range literal with numeric bounds"),
    decl(TypeTag::TsRange, "tsrange", Some(3908), false, "range literal with timestamp bounds"),
    decl(TypeTag::TsTzRange, "tstzrange", Some(3910), false, "range literal with timestamptz bounds"),
    decl(TypeTag::DateRange, "daterange", Some(3912), false, "range literal with date bounds"),
    decl(TypeTag::Bit, "bit", Some(1560), false, "non-empty string of '0'/'1'"),
    decl(TypeTag::VarBit, "varbit", Some(1562), false, "string of '0'/'1'"),
    decl(TypeTag::Money, "money", Some(790), true, "integer cents, float, or numeric text with optional '$'"),
    decl(TypeTag::Oid, "oid", Some(26), true, "integer in the u32 range"),
    decl(TypeTag::RegClass, "regclass", Some(2205), false, "relation name text or OID"),
    decl(TypeTag::RegType, "regtype", Some(2206), false, "type name text or OID"),
    decl(TypeTag::RegProc, "regproc", Some(24), false, "function name text or OID"),
    decl(TypeTag::RegProcedure, "regprocedure", Some(2202), false, "function signature text or OID"),
    decl(TypeTag::RegNamespace, "regnamespace", Some(4089), false, "schema name text or OID"),
    decl(TypeTag::RegRole, "regrole", Some(4096), false, "role name text or OID"),
    decl(TypeTag::RegConfig, "regconfig", Some(3734), false, "text search configuration name or OID"),
    decl(TypeTag::Xml, "xml", Some(142), false, "non-empty XML text"),
    decl(TypeTag::TsVector, "tsvector", Some(3614), false, "non-empty tsvector text"),
    decl(TypeTag::TsQuery, "tsquery", Some(3615), false, "non-empty tsquery text"),
    decl(TypeTag::Custom, "custom", None, false, "[type name, text representation]"),
    decl(TypeTag::Enum, "enum", None, false, "[enum type name, label]"),
];

/// Element type of a range tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeElement {
    Int4,
    Int8,
    Numeric,
    Timestamp,
    TimestampTz,
    Date,
}

impl TypeTag {
    /// Every tag, in declaration order.
    pub const ALL: [TypeTag; 36] = [
        TypeTag::Inet,
        TypeTag::Cidr,
        TypeTag::MacAddr,
        TypeTag::MacAddr8,
        TypeTag::Point,
        TypeTag::Line,
        TypeTag::LineSegment,
        TypeTag::Box,
        TypeTag::Polygon,
        TypeTag::Circle,
        TypeTag::Uuid,
        TypeTag::Json,
        TypeTag::Jsonb,
        TypeTag::Interval,
        TypeTag::Int4Range,
        TypeTag::Int8Range,
        TypeTag::NumRange,
        TypeTag::TsRange,
        TypeTag::TsTzRange,
        TypeTag::DateRange,
        TypeTag::Bit,
        TypeTag::VarBit,
        TypeTag::Money,
        TypeTag::Oid,
        TypeTag::RegClass,
        TypeTag::RegType,
        TypeTag::RegProc,
        TypeTag::RegProcedure,
        TypeTag::RegNamespace,
        TypeTag::RegRole,
        TypeTag::RegConfig,
        TypeTag::Xml,
        TypeTag::TsVector,
        TypeTag::TsQuery,
        TypeTag::Custom,
        TypeTag::Enum,
    ];

    #[must_use]
    pub fn declaration(self) -> &'static TagDecl {
        &DECLARATIONS[self as usize]
    }

    #[must_use]
    pub fn pg_name(self) -> &'static str {
        self.declaration().pg_name
    }

    #[must_use]
    pub fn oid(self) -> Option<u32> {
        self.declaration().oid
    }

    #[must_use]
    pub fn constraint(self) -> &'static str {
        self.declaration().constraint
    }

    #[must_use]
    pub fn supports_binary(self) -> bool {
        self.declaration().binary
    }

    /// Every domain type may fill an OUT slot of a procedure call.
    #[must_use]
    pub fn allowed_as_out_param(self) -> bool {
        true
    }

    /// Tags naming a user-defined server type rather than a builtin.
    #[must_use]
    pub fn is_user_defined(self) -> bool {
        self.oid().is_none()
    }

    #[must_use]
    pub fn from_oid(oid: u32) -> Option<TypeTag> {
        DECLARATIONS
            .iter()
            .find(|d| d.oid == Some(oid))
            .map(|d| d.tag)
    }

    /// Look up a builtin tag by PostgreSQL type name.
    #[must_use]
    pub fn from_pg_name(name: &str) -> Option<TypeTag> {
        DECLARATIONS
            .iter()
            .find(|d| d.oid.is_some() && d.pg_name == name)
            .map(|d| d.tag)
    }

    #[must_use]
    pub fn range_element(self) -> Option<RangeElement> {
        match self {
            TypeTag::Int4Range => Some(RangeElement::Int4),
            TypeTag::Int8Range => Some(RangeElement::Int8),
            TypeTag::NumRange => Some(RangeElement::Numeric),
            TypeTag::TsRange => Some(RangeElement::Timestamp),
            TypeTag::TsTzRange => Some(RangeElement::TimestampTz),
            TypeTag::DateRange => Some(RangeElement::Date),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.pg_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_follow_enum_order() {
        for (idx, tag) in TypeTag::ALL.iter().enumerate() {
            assert_eq!(DECLARATIONS[idx].tag, *tag);
            assert_eq!(tag.declaration().tag, *tag);
        }
    }

    #[test]
    fn oid_and_name_lookups_round_trip() {
        for tag in TypeTag::ALL {
            if let Some(oid) = tag.oid() {
                assert_eq!(TypeTag::from_oid(oid), Some(tag));
                assert_eq!(TypeTag::from_pg_name(tag.pg_name()), Some(tag));
            } else {
                assert!(tag.is_user_defined());
                assert_eq!(TypeTag::from_pg_name(tag.pg_name()), None);
            }
        }
    }

    #[test]
    fn every_tag_may_be_an_out_param() {
        assert!(TypeTag::ALL.iter().all(|t| t.allowed_as_out_param()));
    }

    #[test]
    fn parses_from_cli_value() {
        let tag = TypeTag::from_str("inet", true).unwrap();
        assert_eq!(tag, TypeTag::Inet);
    }
}
