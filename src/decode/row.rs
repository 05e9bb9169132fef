//! Row decoding
//!
//! Drivers hand each row over as [`RawCell`]s. Every cell is scanned into a
//! [`Nullable`] holder first, then converted to the column's logical type.
//! A failure on any column fails the whole row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::types::{column_type, ColumnType, LogicalType};
use crate::config::BackendKind;
use crate::error::{QueryError, QueryResult};
use crate::value::{Record, Value};

/// A cell as produced by a driver
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Json(serde_json::Value),
    Array(Vec<RawCell>),
}

/// A scanned cell: present or SQL NULL
#[derive(Debug, Clone, PartialEq)]
pub enum Nullable<T> {
    Null,
    Present(T),
}

impl<T> Nullable<T> {
    pub fn is_null(&self) -> bool {
        matches!(self, Nullable::Null)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Nullable::Null => None,
            Nullable::Present(v) => Some(v),
        }
    }
}

impl From<RawCell> for Nullable<RawCell> {
    fn from(cell: RawCell) -> Self {
        match cell {
            RawCell::Null => Nullable::Null,
            other => Nullable::Present(other),
        }
    }
}

/// Column metadata reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// Time layouts tried in order for textual time values
const TIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a textual time. Naive values are taken as UTC.
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    for layout in TIME_LAYOUTS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Decodes rows for one result set
#[derive(Debug, Clone)]
pub struct RowDecoder {
    columns: Vec<(String, ColumnType)>,
}

impl RowDecoder {
    pub fn new(kind: BackendKind, columns: &[ColumnMeta]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|c| (c.name.clone(), column_type(kind, &c.type_name, c.nullable)))
                .collect(),
        }
    }

    /// Decode one row. No partial rows: the first failing column fails the call.
    pub fn decode(&self, cells: Vec<RawCell>) -> QueryResult<Record> {
        if cells.len() != self.columns.len() {
            return Err(QueryError::decode(
                "*",
                format!(
                    "row has {} cells but {} columns",
                    cells.len(),
                    self.columns.len()
                ),
            ));
        }
        let mut record = Record::new();
        for ((name, ty), cell) in self.columns.iter().zip(cells) {
            let value = decode_cell(name, ty, Nullable::from(cell))?;
            record.insert(name.clone(), value);
        }
        Ok(record)
    }
}

/// Decode one row against driver metadata.
pub fn decode_row(kind: BackendKind, columns: &[ColumnMeta], cells: Vec<RawCell>) -> QueryResult<Record> {
    RowDecoder::new(kind, columns).decode(cells)
}

fn mismatch(column: &str, ty: &ColumnType, cell: &RawCell) -> QueryError {
    QueryError::decode(column, format!("cannot decode {:?} as {:?}", cell, ty.logical))
}

/// Decode a scanned cell into a value of the column's type.
pub fn decode_cell(column: &str, ty: &ColumnType, cell: Nullable<RawCell>) -> QueryResult<Value> {
    let cell = match cell {
        Nullable::Null if ty.nullable => return Ok(Value::Null),
        Nullable::Null => {
            return Err(QueryError::decode(column, "NULL in non-nullable column"));
        }
        Nullable::Present(cell) => cell,
    };

    if ty.array {
        let element = ty.element();
        return match cell {
            RawCell::Array(items) => items
                .into_iter()
                .map(|item| decode_cell(column, &element, Nullable::from(item)))
                .collect::<QueryResult<Vec<_>>>()
                .map(Value::Array),
            other => Err(mismatch(column, ty, &other)),
        };
    }

    match ty.logical {
        LogicalType::Int
        | LogicalType::Int8
        | LogicalType::Int16
        | LogicalType::Int32
        | LogicalType::Int64 => decode_signed(column, ty, cell).map(Value::Int),
        LogicalType::UInt
        | LogicalType::UInt8
        | LogicalType::UInt16
        | LogicalType::UInt32
        | LogicalType::UInt64 => decode_unsigned(column, ty, cell).map(Value::UInt),
        LogicalType::Float | LogicalType::Double => decode_float(column, ty, cell).map(Value::Float),
        LogicalType::String => Ok(Value::String(match cell {
            RawCell::Text(s) => s,
            RawCell::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
            RawCell::Int(v) => v.to_string(),
            RawCell::UInt(v) => v.to_string(),
            RawCell::Float(v) => v.to_string(),
            RawCell::Time(t) => Value::Time(t).to_wire_string(),
            RawCell::Json(serde_json::Value::String(s)) => s,
            RawCell::Json(v) => v.to_string(),
            other => return Err(mismatch(column, ty, &other)),
        })),
        LogicalType::Time => match cell {
            RawCell::Time(t) => Ok(Value::Time(t)),
            RawCell::Text(ref s) => parse_time(s)
                .map(Value::Time)
                .ok_or_else(|| mismatch(column, ty, &cell)),
            RawCell::Bytes(ref b) => parse_time(&String::from_utf8_lossy(b))
                .map(Value::Time)
                .ok_or_else(|| mismatch(column, ty, &cell)),
            RawCell::Int(secs) => DateTime::from_timestamp(secs, 0)
                .map(Value::Time)
                .ok_or_else(|| mismatch(column, ty, &cell)),
            other => Err(mismatch(column, ty, &other)),
        },
        LogicalType::Bytes => match cell {
            RawCell::Bytes(b) => Ok(Value::Bytes(b)),
            RawCell::Text(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(mismatch(column, ty, &other)),
        },
        LogicalType::Json => match cell {
            RawCell::Json(v) => Ok(Value::Json(v)),
            RawCell::Text(s) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|e| QueryError::decode(column, e.to_string())),
            RawCell::Bytes(b) => serde_json::from_slice(&b)
                .map(Value::Json)
                .map_err(|e| QueryError::decode(column, e.to_string())),
            RawCell::Array(items) => {
                let element = ColumnType::new(LogicalType::Json).nullable(true);
                let values = items
                    .into_iter()
                    .map(|item| decode_cell(column, &element, Nullable::from(item)))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Value::Json(Value::Array(values).to_json()))
            }
            RawCell::Int(v) => Ok(Value::Json(v.into())),
            RawCell::UInt(v) => Ok(Value::Json(v.into())),
            RawCell::Float(v) => Ok(Value::Json(Value::Float(v).to_json())),
            RawCell::Time(t) => Ok(Value::Json(Value::Time(t).to_json())),
            RawCell::Null => Ok(Value::Null),
        },
    }
}

fn decode_signed(column: &str, ty: &ColumnType, cell: RawCell) -> QueryResult<i64> {
    let value = match &cell {
        RawCell::Int(v) => Some(*v),
        RawCell::UInt(v) => i64::try_from(*v).ok(),
        RawCell::Text(s) => s.trim().parse().ok(),
        RawCell::Bytes(b) => std::str::from_utf8(b).ok().and_then(|s| s.trim().parse().ok()),
        _ => None,
    }
    .ok_or_else(|| mismatch(column, ty, &cell))?;

    match ty.logical.signed_bounds() {
        Some((min, max)) if value < min || value > max => Err(QueryError::decode(
            column,
            format!("{} out of range for {:?}", value, ty.logical),
        )),
        _ => Ok(value),
    }
}

fn decode_unsigned(column: &str, ty: &ColumnType, cell: RawCell) -> QueryResult<u64> {
    let value = match &cell {
        RawCell::UInt(v) => Some(*v),
        RawCell::Int(v) => u64::try_from(*v).ok(),
        RawCell::Text(s) => s.trim().parse().ok(),
        RawCell::Bytes(b) => std::str::from_utf8(b).ok().and_then(|s| s.trim().parse().ok()),
        _ => None,
    }
    .ok_or_else(|| mismatch(column, ty, &cell))?;

    match ty.logical.unsigned_max() {
        Some(max) if value > max => Err(QueryError::decode(
            column,
            format!("{} out of range for {:?}", value, ty.logical),
        )),
        _ => Ok(value),
    }
}

/// Numeric cells of any form. A decimal column's scale divides every
/// representation, text and float included, not only integers.
fn decode_float(column: &str, ty: &ColumnType, cell: RawCell) -> QueryResult<f64> {
    let value = match &cell {
        RawCell::Float(v) => Some(*v),
        RawCell::Int(v) => Some(*v as f64),
        RawCell::UInt(v) => Some(*v as f64),
        RawCell::Text(s) => s.trim().parse().ok(),
        RawCell::Bytes(b) => std::str::from_utf8(b).ok().and_then(|s| s.trim().parse().ok()),
        _ => None,
    }
    .ok_or_else(|| mismatch(column, ty, &cell))?;

    Ok(match ty.decimal_scale {
        Some(scale) => value / 10f64.powi(scale as i32),
        None => value,
    })
}
