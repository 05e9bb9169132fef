//! Outbound response shapes

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::error::QueryError;
use crate::value::{Record, Value};

/// Paging and backend metadata attached to list results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detail {
    pub page: u64,
    pub size: u64,
    pub total: u64,
    pub total_page: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Detail {
    /// Paging detail with `total_page = ceil(total / size)`
    pub fn paged(page: u64, size: u64, total: u64) -> Self {
        Self {
            page,
            size,
            total,
            total_page: total_pages(total, size),
            ..Default::default()
        }
    }
}

pub fn total_pages(total: u64, size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        total.div_ceil(size)
    }
}

/// Result of a write
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of a batch-mode bulk insert
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchInsertOutcome {
    /// Failed row index to its error
    #[serde(serialize_with = "serialize_failures")]
    pub failed: BTreeMap<usize, QueryError>,
    /// Surviving rows were committed by the retry pass
    pub retried_ok: bool,
    pub rows_affected: u64,
}

impl BatchInsertOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn serialize_failures<S: Serializer>(
    failed: &BTreeMap<usize, QueryError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let as_text: BTreeMap<usize, String> =
        failed.iter().map(|(i, e)| (*i, e.to_string())).collect();
    as_text.serialize(serializer)
}

/// Sorted-set members with their scores, as parallel slices
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberScores {
    pub members: Vec<String>,
    pub scores: Vec<f64>,
}

/// Decoded result payload
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    None,
    Record(Record),
    Records(Vec<Record>),
    Count(u64),
    Modified(ModResult),
    BulkModified(Vec<ModResult>),
    BatchInsert(BatchInsertOutcome),
    Value(Value),
    Values(Vec<Value>),
    StringMap(BTreeMap<String, Value>),
    MemberScores(MemberScores),
}

/// Uniform response
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub output: QueryOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
    /// The lookup matched nothing
    pub is_nil: bool,
}

impl Response {
    pub fn new(output: QueryOutput) -> Self {
        Self {
            output,
            detail: None,
            is_nil: false,
        }
    }

    pub fn nil() -> Self {
        Self {
            output: QueryOutput::None,
            detail: None,
            is_nil: true,
        }
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn records(&self) -> &[Record] {
        match &self.output {
            QueryOutput::Records(rows) => rows,
            QueryOutput::Record(row) => std::slice::from_ref(row),
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(21, 10), 3);
        assert_eq!(total_pages(20, 10), 2);
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_batch_outcome_serializes_errors_as_text() {
        let mut outcome = BatchInsertOutcome::default();
        outcome
            .failed
            .insert(2, QueryError::invalid_value("bad row"));
        outcome.retried_ok = true;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["failed"]["2"], "invalid value: bad row");
        assert_eq!(json["retried_ok"], true);
    }

    #[test]
    fn test_nil_response() {
        let resp = Response::nil();
        assert!(resp.is_nil);
        assert!(resp.records().is_empty());
    }
}
