//! Search response decoding
//!
//! Hits become [`Record`]s built from `_source`, with hit metadata under
//! `_elastic`, inner hits under `innerhit_<name>` and highlight fragments
//! under `highlight_<field>`.

use serde_json::{json, Map, Value as Json};

use crate::error::{BackendErrorKind, QueryError, QueryResult};
use crate::response::{total_pages, Detail, ModResult};
use crate::value::{record_to_json, Record, Value};

use super::params::HighlightSpec;
use super::plan::DecodeOptions;

pub const BACKEND: &str = "elastic";

/// Turn an error body (`{"error": .., "status": ..}`) into a backend error.
pub fn check_error(body: &Json) -> QueryResult<()> {
    let Some(error) = body.get("error").filter(|e| !e.is_null()) else {
        return Ok(());
    };
    let status = body.get("status").and_then(Json::as_i64).unwrap_or(0);
    let reason = match error {
        Json::String(s) => s.clone(),
        other => other
            .get("reason")
            .and_then(Json::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    Err(QueryError::backend(
        BACKEND,
        BackendErrorKind::QueryRejected,
        status,
        reason,
    ))
}

/// Decoded search hits plus optional paging detail
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub records: Vec<Record>,
    pub detail: Option<Detail>,
}

/// Decode a `_search` (or scroll) response.
pub fn decode_search(body: &Json, opts: &DecodeOptions) -> QueryResult<SearchHits> {
    check_error(body)?;
    let hits = body
        .get("hits")
        .ok_or_else(|| QueryError::decode("hits", "search response has no hits"))?;
    let records = decode_hits(hits, &opts.highlights)?;

    let detail = if opts.page > 0 || opts.scroll {
        let mut detail = hits_detail(hits, opts.page, opts.size);
        if opts.scroll {
            detail.scroll = body
                .get("_scroll_id")
                .and_then(Json::as_str)
                .map(str::to_string);
        }
        for key in ["took", "timed_out", "_shards"] {
            if let Some(v) = body.get(key) {
                detail.extras.insert(key.to_string(), v.clone());
            }
        }
        Some(detail)
    } else {
        None
    };

    Ok(SearchHits { records, detail })
}

fn total_hits(hits: &Json) -> u64 {
    match hits.get("total") {
        Some(Json::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Json::Object(t)) => t.get("value").and_then(Json::as_u64).unwrap_or(0),
        _ => 0,
    }
}

fn hits_detail(hits: &Json, page: u64, size: u64) -> Detail {
    let total = total_hits(hits);
    let mut detail = Detail {
        page,
        size,
        total,
        total_page: total_pages(total, size),
        ..Default::default()
    };
    if let Some(t) = hits.get("total") {
        detail.extras.insert("total".into(), t.clone());
    }
    detail.extras.insert(
        "max_score".into(),
        hits.get("max_score").cloned().unwrap_or(Json::Null),
    );
    detail
}

fn decode_hits(hits: &Json, highlights: &[HighlightSpec]) -> QueryResult<Vec<Record>> {
    let Some(items) = hits.get("hits").and_then(Json::as_array) else {
        return Ok(Vec::new());
    };
    items.iter().map(|hit| decode_hit(hit, highlights)).collect()
}

fn decode_hit(hit: &Json, highlights: &[HighlightSpec]) -> QueryResult<Record> {
    let mut record: Record = match hit.get("_source") {
        Some(Json::Object(source)) => source
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect(),
        None | Some(Json::Null) => Record::new(),
        Some(_) => return Err(QueryError::decode("_source", "hit source is not an object")),
    };

    let mut meta = Map::new();
    meta.insert("score".into(), hit.get("_score").cloned().unwrap_or(Json::Null));
    meta.insert("index".into(), hit.get("_index").cloned().unwrap_or(Json::Null));
    meta.insert("id".into(), hit.get("_id").cloned().unwrap_or(Json::Null));
    if let Some(nested) = hit.get("_nested") {
        meta.insert("nested".into(), nested.clone());
    }
    record.insert("_elastic".into(), Value::Json(Json::Object(meta)));

    if let Some(Json::Object(inner)) = hit.get("inner_hits") {
        for (name, block) in inner {
            let Some(hits) = block.get("hits") else { continue };
            let data = decode_hits(hits, &[])?;
            let detail = hits_detail(hits, 0, 0);
            record.insert(
                format!("innerhit_{}", name),
                Value::Json(json!({
                    "detail": serde_json::to_value(&detail).unwrap_or(Json::Null),
                    "data": data.iter().map(record_to_json).collect::<Vec<_>>(),
                })),
            );
        }
    }

    if let Some(Json::Object(fragments)) = hit.get("highlight") {
        for spec in highlights {
            if let Some(found) = fragments.get(&spec.field) {
                if spec.replace {
                    record.remove(&spec.field);
                }
                record.insert(
                    format!("highlight_{}", spec.field),
                    Value::from(found.clone()),
                );
            }
        }
    }

    Ok(record)
}

/// Decode a single-document write (`index`, `create`, `update`, `delete`).
pub fn decode_doc_write(body: &Json) -> QueryResult<ModResult> {
    check_error(body)?;
    let result = body.get("result").and_then(Json::as_str).unwrap_or("");
    let rows_affected = match result {
        "noop" | "not_found" => 0,
        _ => 1,
    };
    Ok(ModResult {
        id: body.get("_id").cloned().map(Value::from),
        rows_affected,
        version: body.get("_version").and_then(Json::as_i64),
        ..Default::default()
    })
}

/// Decode an `_update_by_query` / `_delete_by_query` response.
pub fn decode_by_query(body: &Json, counter: &str) -> QueryResult<ModResult> {
    check_error(body)?;
    if let Some(Json::Array(failures)) = body.get("failures") {
        if let Some(first) = failures.first() {
            let status = first.get("status").and_then(Json::as_i64).unwrap_or(0);
            let reason = first
                .pointer("/cause/reason")
                .and_then(Json::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| first.to_string());
            return Err(QueryError::backend(
                BACKEND,
                BackendErrorKind::QueryRejected,
                status,
                reason,
            ));
        }
    }
    Ok(ModResult {
        rows_affected: body.get(counter).and_then(Json::as_u64).unwrap_or(0),
        ..Default::default()
    })
}

/// Decode a `_bulk` response into one result per item.
///
/// Individual failures are reported per item. When every item failed the
/// whole call fails with the first item's status and reason.
pub fn decode_bulk(body: &Json) -> QueryResult<Vec<ModResult>> {
    check_error(body)?;
    let items = body
        .get("items")
        .and_then(Json::as_array)
        .ok_or_else(|| QueryError::decode("items", "bulk response has no items"))?;

    let mut results = Vec::with_capacity(items.len());
    let mut first_failure: Option<(i64, String)> = None;
    for item in items {
        let Some(entry) = item.as_object().and_then(|m| m.values().next()) else {
            continue;
        };
        let status = entry.get("status").and_then(Json::as_i64).unwrap_or(0);
        let mut result = ModResult {
            id: entry.get("_id").cloned().map(Value::from),
            version: entry.get("_version").and_then(Json::as_i64),
            status: Some(status),
            ..Default::default()
        };
        if (200..300).contains(&status) {
            result.rows_affected = 1;
        } else {
            let reason = entry
                .pointer("/error/reason")
                .and_then(Json::as_str)
                .unwrap_or("unknown bulk failure")
                .to_string();
            first_failure.get_or_insert((status, reason.clone()));
            result.reason = Some(reason);
        }
        results.push(result);
    }

    if !results.is_empty() && results.iter().all(|r| r.rows_affected == 0) {
        if let Some((status, reason)) = first_failure {
            return Err(QueryError::backend(
                BACKEND,
                BackendErrorKind::QueryRejected,
                status,
                reason,
            ));
        }
    }
    Ok(results)
}
