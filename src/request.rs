//! # Normalized Request
//!
//! The backend-agnostic query description every compiler consumes. Hosts
//! build it directly or deserialize it from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{QueryError, QueryResult};
use crate::value::{Record, Value};

/// Join flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// A joined table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(rename = "type", default)]
    pub kind: JoinKind,

    /// `"t"`, `"t AS a"` or `"t a"`
    pub table: String,

    /// `USING (..)` columns; takes precedence over `on`
    #[serde(default)]
    pub using: Vec<String>,

    /// `ON left = right` pairs
    #[serde(default)]
    pub on: BTreeMap<String, String>,
}

/// Raw statement that bypasses compilation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQuery {
    pub query: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Scroll cursor for search backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrollSpec {
    /// Continue an existing scroll
    #[serde(default)]
    pub id: Option<String>,

    /// Keep-alive, for example `"1m"`
    #[serde(default)]
    pub keep_alive: Option<String>,
}

/// Order by clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    /// `"-age"` sorts descending; `"+age"` and `"age"` ascending.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (field, ascending) = if let Some(rest) = spec.strip_prefix('-') {
            (rest, false)
        } else if let Some(rest) = spec.strip_prefix('+') {
            (rest, true)
        } else {
            (spec, true)
        };
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            ascending,
        })
    }
}

/// Normalized request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    /// Operation: `insert`, `find_all`, `zrangebyscore`, ...
    pub op: String,

    /// Table or index names. The first entry is the primary target.
    pub tables: Vec<String>,

    pub alias: Option<String>,

    /// Columns to project; empty means all
    pub columns: Vec<String>,

    #[serde(rename = "where")]
    pub condition: Condition,

    pub having: Condition,

    pub group: Vec<String>,

    pub order: Vec<String>,

    pub joins: Vec<JoinSpec>,

    /// Single-row payload
    pub data: Option<Record>,

    /// Multi-row payload
    pub datas: Vec<Record>,

    pub page: u64,
    pub size: u64,
    pub from: u64,

    pub distinct: bool,

    /// Append a `FOR UPDATE` lock clause
    pub for_update: bool,

    /// Free-form extras: `batch`, `highlights`, `collapse`, `refresh`, ...
    pub params: BTreeMap<String, serde_json::Value>,

    pub raw: Option<RawQuery>,

    /// Search-engine document type (pre-7 versions)
    pub doc_type: Option<String>,

    pub scroll: Option<ScrollSpec>,

    // Key-value fields
    pub prefix: String,
    pub key: String,
    pub field: String,
    pub value: Option<Value>,
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(op: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            tables: vec![table.into()],
            ..Default::default()
        }
    }

    /// Parse from JSON
    pub fn from_json(value: serde_json::Value) -> QueryResult<Self> {
        serde_json::from_value(value).map_err(|e| QueryError::invalid_request(e.to_string()))
    }

    pub fn with_where(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, data: Record) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_datas(mut self, datas: Vec<Record>) -> Self {
        self.datas = datas;
        self
    }

    pub fn with_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page(mut self, page: u64, size: u64) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Primary table or index
    pub fn table(&self) -> QueryResult<&str> {
        self.tables
            .first()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| QueryError::invalid_request("no table specified"))
    }

    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.get(name)
    }

    pub fn param_bool(&self, name: &str) -> bool {
        matches!(self.params.get(name), Some(serde_json::Value::Bool(true)))
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }

    /// Batch mode: per-row failures are collected instead of aborting
    pub fn is_batch(&self) -> bool {
        self.param_bool("batch")
    }

    /// Payload rows: `datas` when present, else `data`
    pub fn rows(&self) -> Vec<&Record> {
        if !self.datas.is_empty() {
            self.datas.iter().collect()
        } else {
            self.data.iter().collect()
        }
    }

    /// Parsed ORDER BY list; blank entries are skipped
    pub fn order_by(&self) -> Vec<OrderBy> {
        self.order.iter().filter_map(|o| OrderBy::parse(o)).collect()
    }

    /// Offset implied by page/size, or the explicit `from`
    pub fn offset(&self) -> u64 {
        if self.page > 0 && self.size > 0 {
            (self.page - 1) * self.size
        } else {
            self.from
        }
    }

    /// Lower-cased operation name
    pub fn op_name(&self) -> String {
        self.op.trim().to_ascii_lowercase()
    }
}
