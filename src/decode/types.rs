//! Column type maps
//!
//! Backend type names resolve to a small closed set of logical types. MySQL
//! names (and the PostgreSQL/SQLite aliases routed through the same table)
//! are matched case-insensitively with any `(..)` length suffix removed.
//! ClickHouse names are unwrapped structurally.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::BackendKind;

/// Logical column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Time,
    Bytes,
    Json,
}

impl LogicalType {
    /// Inclusive bounds for signed integer types
    pub fn signed_bounds(&self) -> Option<(i64, i64)> {
        match self {
            LogicalType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            LogicalType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            LogicalType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            LogicalType::Int | LogicalType::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Upper bound for unsigned integer types
    pub fn unsigned_max(&self) -> Option<u64> {
        match self {
            LogicalType::UInt8 => Some(u8::MAX as u64),
            LogicalType::UInt16 => Some(u16::MAX as u64),
            LogicalType::UInt32 => Some(u32::MAX as u64),
            LogicalType::UInt | LogicalType::UInt64 => Some(u64::MAX),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LogicalType::Float | LogicalType::Double)
    }
}

/// Resolved type of one result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnType {
    pub logical: LogicalType,
    pub nullable: bool,
    /// Array of `logical`
    pub array: bool,
    /// Fixed-point scale; decoded values are divided by `10^scale`
    pub decimal_scale: Option<u32>,
}

impl ColumnType {
    pub fn new(logical: LogicalType) -> Self {
        Self {
            logical,
            nullable: false,
            array: false,
            decimal_scale: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Element type of an array column
    pub fn element(&self) -> Self {
        Self { array: false, ..*self }
    }
}

/// MySQL-family type name to logical type. Unknown names map to `Json`.
pub fn mysql_type(type_name: &str) -> LogicalType {
    let mut name = type_name.trim().to_ascii_uppercase();
    if let Some(open) = name.find('(') {
        let close = name[open..].find(')').map(|c| open + c + 1).unwrap_or(name.len());
        name.replace_range(open..close, "");
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    let unsigned = words.contains(&"UNSIGNED");
    let base: Vec<&str> = words
        .into_iter()
        .filter(|w| *w != "UNSIGNED" && *w != "ZEROFILL" && *w != "SIGNED")
        .collect();
    let base = base.join(" ");

    let signed = match base.as_str() {
        "INT" | "INTEGER" | "INT4" | "SERIAL" => LogicalType::Int,
        "TINYINT" | "BOOL" | "BOOLEAN" => LogicalType::Int8,
        "SMALLINT" | "INT2" | "SMALLSERIAL" => LogicalType::Int16,
        "MEDIUMINT" => LogicalType::Int32,
        "BIGINT" | "INT8" | "BIGSERIAL" => LogicalType::Int64,
        "FLOAT" | "REAL" | "FLOAT4" => LogicalType::Float,
        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" | "DECIMAL" | "NUMERIC" => LogicalType::Double,
        "VARCHAR" | "CHAR" | "CHARACTER" | "CHARACTER VARYING" | "TEXT" | "TINYTEXT"
        | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" | "TIME" | "UUID" | "NVARCHAR" | "CLOB" => {
            LogicalType::String
        }
        "BIT" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY"
        | "BYTEA" => LogicalType::Bytes,
        "DATE" | "DATETIME" | "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE"
        | "TIMESTAMP WITHOUT TIME ZONE" | "YEAR" => LogicalType::Time,
        _ => LogicalType::Json,
    };

    if !unsigned {
        return signed;
    }
    match signed {
        LogicalType::Int => LogicalType::UInt,
        LogicalType::Int8 => LogicalType::UInt8,
        LogicalType::Int16 => LogicalType::UInt16,
        LogicalType::Int32 => LogicalType::UInt32,
        LogicalType::Int64 => LogicalType::UInt64,
        other => other,
    }
}

fn decimal_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^Decimal(?:32|64|128|256)?\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)$").ok()
        })
        .as_ref()
}

/// Split `Wrapper(inner)` into `inner` when the name starts with `wrapper(`.
fn unwrap_named<'a>(name: &'a str, wrapper: &str) -> Option<&'a str> {
    name.strip_prefix(wrapper)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

/// ClickHouse type name to column type.
///
/// `Array(T)`, `Nullable(T)` and `LowCardinality(T)` are unwrapped,
/// `Decimal(P, S)` and `DecimalN(S)` carry scale `S`, `FixedString(N)` is a
/// string and `Tuple`/`Map`/`Nested` decode as JSON.
pub fn clickhouse_type(type_name: &str) -> ColumnType {
    let name = type_name.trim();

    if let Some(inner) = unwrap_named(name, "Array") {
        let mut element = clickhouse_type(inner);
        element.array = true;
        return element;
    }
    if let Some(inner) = unwrap_named(name, "Nullable") {
        return clickhouse_type(inner).nullable(true);
    }
    if let Some(inner) = unwrap_named(name, "LowCardinality") {
        return clickhouse_type(inner);
    }

    if name.starts_with("Decimal") {
        let mut ty = ColumnType::new(LogicalType::Double);
        if let Some(caps) = decimal_pattern().and_then(|re| re.captures(name)) {
            // Decimal(P, S) carries both; DecimalN(S) only the scale
            let scale = match (caps.get(1), caps.get(2)) {
                (_, Some(s)) => s.as_str().parse().ok(),
                (Some(s), None) if name != "Decimal" && !name.starts_with("Decimal(") => {
                    s.as_str().parse().ok()
                }
                _ => None,
            };
            ty.decimal_scale = scale.filter(|s: &u32| *s > 0);
        }
        return ty;
    }
    if name.starts_with("FixedString") || name.starts_with("Enum") {
        return ColumnType::new(LogicalType::String);
    }
    if name.starts_with("Tuple") || name.starts_with("Map") || name.starts_with("Nested") {
        return ColumnType::new(LogicalType::Json);
    }
    // DateTime('UTC') / DateTime64(3, 'UTC')
    if name.starts_with("Date") {
        return ColumnType::new(LogicalType::Time);
    }

    let logical = match name {
        "Int" => LogicalType::Int,
        "Int8" | "Bool" => LogicalType::Int8,
        "Int16" => LogicalType::Int16,
        "Int32" => LogicalType::Int32,
        "Int64" => LogicalType::Int64,
        "UInt" => LogicalType::UInt,
        "UInt8" => LogicalType::UInt8,
        "UInt16" => LogicalType::UInt16,
        "UInt32" => LogicalType::UInt32,
        "UInt64" => LogicalType::UInt64,
        "Float" | "Float32" => LogicalType::Float,
        "Float64" => LogicalType::Double,
        "String" | "UUID" | "IPv4" | "IPv6" => LogicalType::String,
        _ => LogicalType::Json,
    };
    ColumnType::new(logical)
}

/// Resolve a reported column type for `kind`.
///
/// `nullable` is the driver's nullability flag; ClickHouse also encodes it in
/// the type name and either source marks the column nullable.
pub fn column_type(kind: BackendKind, type_name: &str, nullable: bool) -> ColumnType {
    match kind {
        BackendKind::Clickhouse => {
            let ty = clickhouse_type(type_name);
            let nullable = ty.nullable || nullable;
            ty.nullable(nullable)
        }
        _ => ColumnType::new(mysql_type(type_name)).nullable(nullable),
    }
}
