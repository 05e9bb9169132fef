//! Result decoder and type map
//!
//! Converts driver column metadata and raw cells into [`Record`](crate::value::Record)s
//! with correct nullability, integer widths and decimal scale.

mod row;
mod types;

pub use row::{decode_cell, decode_row, parse_time, ColumnMeta, Nullable, RawCell, RowDecoder};
pub use types::{clickhouse_type, column_type, mysql_type, ColumnType, LogicalType};
