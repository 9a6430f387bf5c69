//! Type catalog
//!
//! Static mapping from PostgreSQL type OIDs to readable type names.

use std::borrow::Cow;

/// Built-in type OIDs and their display names
const BUILTIN_TYPES: &[(u32, &str)] = &[
    (16, "boolean"),
    (17, "bytea"),
    (18, "char"),
    (19, "name"),
    (20, "bigint"),
    (21, "smallint"),
    (22, "int2vector"),
    (23, "integer"),
    (24, "regproc"),
    (25, "text"),
    (26, "oid"),
    (27, "tid"),
    (28, "xid"),
    (29, "cid"),
    (114, "json"),
    (142, "xml"),
    (143, "xml[]"),
    (194, "pg_node_tree"),
    (199, "json[]"),
    (600, "point"),
    (601, "lseg"),
    (602, "path"),
    (603, "box"),
    (604, "polygon"),
    (628, "line"),
    (650, "cidr"),
    (651, "cidr[]"),
    (700, "real"),
    (701, "double precision"),
    (705, "unknown"),
    (718, "circle"),
    (774, "macaddr8"),
    (790, "money"),
    (829, "macaddr"),
    (869, "inet"),
    (1000, "boolean[]"),
    (1001, "bytea[]"),
    (1005, "smallint[]"),
    (1007, "integer[]"),
    (1009, "text[]"),
    (1014, "character[]"),
    (1015, "character varying[]"),
    (1016, "bigint[]"),
    (1021, "real[]"),
    (1022, "double precision[]"),
    (1028, "oid[]"),
    (1033, "aclitem"),
    (1034, "aclitem[]"),
    (1041, "inet[]"),
    (1042, "character"),
    (1043, "character varying"),
    (1082, "date"),
    (1083, "time without time zone"),
    (1114, "timestamp without time zone"),
    (1115, "timestamp without time zone[]"),
    (1182, "date[]"),
    (1183, "time without time zone[]"),
    (1184, "timestamp with time zone"),
    (1185, "timestamp with time zone[]"),
    (1186, "interval"),
    (1187, "interval[]"),
    (1231, "numeric[]"),
    (1266, "time with time zone"),
    (1560, "bit"),
    (1562, "bit varying"),
    (1700, "numeric"),
    (1790, "refcursor"),
    (2202, "regprocedure"),
    (2203, "regoper"),
    (2204, "regoperator"),
    (2205, "regclass"),
    (2206, "regtype"),
    (2249, "record"),
    (2275, "cstring"),
    (2276, "any"),
    (2277, "anyarray"),
    (2278, "void"),
    (2950, "uuid"),
    (2951, "uuid[]"),
    (3220, "pg_lsn"),
    (3614, "tsvector"),
    (3615, "tsquery"),
    (3734, "regconfig"),
    (3802, "jsonb"),
    (3807, "jsonb[]"),
    (3904, "int4range"),
    (3906, "numrange"),
    (3908, "tsrange"),
    (3910, "tstzrange"),
    (3912, "daterange"),
    (3926, "int8range"),
    (4072, "jsonpath"),
    (4089, "regnamespace"),
    (4096, "regrole"),
];

/// Lookup table from type identifiers to readable type names
pub struct TypeCatalog;

impl TypeCatalog {
    /// Resolve a type identifier to its display name.
    ///
    /// Total: identifiers outside the table resolve to `unknown(<id>)`.
    pub fn resolve(type_id: u32) -> Cow<'static, str> {
        match Self::lookup(type_id) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("unknown({})", type_id)),
        }
    }

    /// Resolve a type identifier only when it is a known built-in
    pub fn lookup(type_id: u32) -> Option<&'static str> {
        BUILTIN_TYPES
            .binary_search_by_key(&type_id, |(id, _)| *id)
            .ok()
            .map(|idx| BUILTIN_TYPES[idx].1)
    }

    /// Every known identifier, ascending
    pub fn known_ids() -> impl Iterator<Item = u32> {
        BUILTIN_TYPES.iter().map(|(id, _)| *id)
    }
}
