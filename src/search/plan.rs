//! Request planning for the search engine
//!
//! Turns a [`Request`] into the HTTP call the search engine expects: method,
//! path, query string and body. A condition holding only a single `_id`
//! selects the by-id variant of update and delete; several ids or extra keys
//! go by query. A non-null `_id` also supplies the document id for single
//! inserts.

use serde_json::{json, Map, Value as Json};

use crate::error::{QueryError, QueryResult};
use crate::request::Request;
use crate::value::{record_to_json, Record, Value};

use super::compile::compile_condition;
use super::params::{CollapseSpec, HighlightSpec};
use super::query::sort_json;

const DEFAULT_SCROLL_KEEP_ALIVE: &str = "1m";

/// HTTP verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPayload {
    Json(Json),
    /// Newline-delimited JSON for the bulk API
    NdJson(String),
}

/// One call to the search engine
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<SearchPayload>,
}

impl SearchRequest {
    fn new(method: HttpMethod, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn json(mut self, body: Json) -> Self {
        self.body = Some(SearchPayload::Json(body));
        self
    }

    fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    /// Single-line rendering for logs
    pub fn describe(&self) -> String {
        let mut out = format!("{} {}", self.method.as_str(), self.path);
        if !self.query.is_empty() {
            let qs: Vec<String> = self.query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            out.push('?');
            out.push_str(&qs.join("&"));
        }
        match &self.body {
            Some(SearchPayload::Json(body)) => {
                out.push(' ');
                out.push_str(&body.to_string());
            }
            Some(SearchPayload::NdJson(lines)) => {
                out.push(' ');
                out.push_str(&lines.replace('\n', " "));
            }
            None => {}
        }
        out
    }
}

/// Search operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    Insert,
    Replace,
    BulkInsert,
    BulkReplace,
    UpdateById,
    UpdateByQuery,
    DeleteById,
    DeleteByQuery,
    Find,
    FindAll,
    ScrollStart,
    ScrollNext,
}

impl SearchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOp::Insert => "insert",
            SearchOp::Replace => "replace",
            SearchOp::BulkInsert => "bulk_insert",
            SearchOp::BulkReplace => "bulk_replace",
            SearchOp::UpdateById => "update_by_id",
            SearchOp::UpdateByQuery => "update_by_query",
            SearchOp::DeleteById => "delete_by_id",
            SearchOp::DeleteByQuery => "delete_by_query",
            SearchOp::Find => "find",
            SearchOp::FindAll => "find_all",
            SearchOp::ScrollStart => "scroll_start",
            SearchOp::ScrollNext => "scroll_next",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            SearchOp::Find | SearchOp::FindAll | SearchOp::ScrollStart | SearchOp::ScrollNext
        )
    }
}

/// How the response should be decoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    pub page: u64,
    pub size: u64,
    pub scroll: bool,
    pub highlights: Vec<HighlightSpec>,
}

/// Compiled search call plus decode hints
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    pub op: SearchOp,
    pub request: SearchRequest,
    pub decode: DecodeOptions,
}

struct Target<'a> {
    index: &'a str,
    indices: String,
    doc_type: Option<&'a str>,
    legacy: bool,
}

impl Target<'_> {
    fn doc_path(&self, id: Option<&str>) -> String {
        let kind = match (self.legacy, self.doc_type) {
            (true, Some(t)) => t,
            _ => "_doc",
        };
        match id {
            Some(id) => format!("/{}/{}/{}", self.index, kind, id),
            None => format!("/{}/{}", self.index, kind),
        }
    }

    fn update_path(&self, id: &str) -> String {
        match (self.legacy, self.doc_type) {
            (true, Some(t)) => format!("/{}/{}/{}/_update", self.index, t, id),
            _ => format!("/{}/_update/{}", self.index, id),
        }
    }

    fn bulk_path(&self) -> String {
        match (self.legacy, self.doc_type) {
            (true, Some(t)) => format!("/{}/{}/_bulk", self.index, t),
            _ => format!("/{}/_bulk", self.index),
        }
    }

    fn indices_path(&self, endpoint: &str) -> String {
        format!("/{}/{}", self.indices, endpoint)
    }
}

/// Compile a request for a search backend of the given major version.
pub fn compile_search(request: &Request, major_version: Option<u32>) -> QueryResult<SearchPlan> {
    let index = request.table()?;
    let target = Target {
        index,
        indices: request.tables.join(","),
        doc_type: request.doc_type.as_deref().filter(|t| !t.is_empty()),
        legacy: major_version.map(|v| v < 7).unwrap_or(false),
    };
    let ids = condition_ids(request);
    let by_id = single_id(request, &ids);
    let highlights = match request.param("highlights") {
        Some(value) => HighlightSpec::parse_list(value)?,
        None => Vec::new(),
    };

    let mut decode = DecodeOptions {
        page: request.page,
        size: request.size,
        scroll: false,
        highlights,
    };

    let (op, call) = match request.op_name().as_str() {
        op @ ("insert" | "replace") => {
            let replace = op == "replace";
            if request.datas.is_empty() {
                insert_call(&target, request, ids.first().map(String::as_str), replace)?
            } else {
                bulk_call(&target, request, replace)?
            }
        }
        "update" => match by_id {
            Some(id) => (
                SearchOp::UpdateById,
                SearchRequest::new(HttpMethod::Post, target.update_path(id))
                    .json(json!({ "script": script(request)? })),
            ),
            None => (
                SearchOp::UpdateByQuery,
                SearchRequest::new(HttpMethod::Post, target.indices_path("_update_by_query")).json(
                    json!({
                        "query": compile_condition(&request.condition)?.to_json(),
                        "script": script(request)?,
                    }),
                ),
            ),
        },
        "delete" => match by_id {
            Some(id) => (
                SearchOp::DeleteById,
                SearchRequest::new(HttpMethod::Delete, target.doc_path(Some(id))),
            ),
            None => (
                SearchOp::DeleteByQuery,
                SearchRequest::new(HttpMethod::Post, target.indices_path("_delete_by_query"))
                    .json(json!({ "query": compile_condition(&request.condition)?.to_json() })),
            ),
        },
        "find" => {
            decode.page = 0;
            decode.size = 1;
            (
                SearchOp::Find,
                SearchRequest::new(HttpMethod::Post, target.indices_path("_search"))
                    .json(search_body(request, &decode, Some((1, 0)))?),
            )
        }
        "find_all" | "findall" | "search" => match &request.scroll {
            Some(scroll) => {
                decode.scroll = true;
                let keep_alive = scroll
                    .keep_alive
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SCROLL_KEEP_ALIVE.to_string());
                match scroll.id.as_deref().filter(|id| !id.is_empty()) {
                    Some(id) => (
                        SearchOp::ScrollNext,
                        SearchRequest::new(HttpMethod::Post, "/_search/scroll".to_string())
                            .json(json!({ "scroll": keep_alive, "scroll_id": id })),
                    ),
                    None => {
                        let size = (request.size > 0).then_some((request.size, 0));
                        (
                            SearchOp::ScrollStart,
                            SearchRequest::new(HttpMethod::Post, target.indices_path("_search"))
                                .param("scroll", keep_alive)
                                .json(search_body(request, &decode, size)?),
                        )
                    }
                }
            }
            None => {
                let window = (request.size > 0).then(|| (request.size, request.offset()));
                (
                    SearchOp::FindAll,
                    SearchRequest::new(HttpMethod::Post, target.indices_path("_search"))
                        .json(search_body(request, &decode, window)?),
                )
            }
        },
        other => {
            return Err(QueryError::invalid_request(format!(
                "unsupported search op `{}`",
                other
            )))
        }
    };

    Ok(SearchPlan {
        op,
        request: with_write_params(call, request, op),
        decode,
    })
}

fn with_write_params(mut call: SearchRequest, request: &Request, op: SearchOp) -> SearchRequest {
    if op.is_write() {
        if request.param_bool("refresh") {
            call = call.param("refresh", "true");
        }
        if let Some(routing) = request.param_str("routing").filter(|r| !r.is_empty()) {
            call = call.param("routing", routing);
        }
    }
    call
}

/// Ids named by a non-null `_id` condition entry
fn condition_ids(request: &Request) -> Vec<String> {
    match request.condition.get("_id") {
        Some(value) if !value.is_null() => match value.to_value() {
            Value::Array(items) => items.iter().map(Value::to_wire_string).collect(),
            single => vec![single.to_wire_string()],
        },
        _ => Vec::new(),
    }
}

/// The id for a by-id write: `_id` is the only condition key and names
/// exactly one document. Anything else goes through the by-query endpoints.
fn single_id<'a>(request: &Request, ids: &'a [String]) -> Option<&'a str> {
    match ids {
        [id] if request.condition.len() == 1 => Some(id.as_str()),
        _ => None,
    }
}

/// Split `_id` off a document
fn split_id(doc: &Record) -> (Option<String>, Json) {
    let mut doc = doc.clone();
    let id = doc
        .remove("_id")
        .filter(|v| !v.is_null())
        .map(|v| v.to_wire_string());
    (id, record_to_json(&doc))
}

fn insert_call(
    target: &Target<'_>,
    request: &Request,
    id: Option<&str>,
    replace: bool,
) -> QueryResult<(SearchOp, SearchRequest)> {
    let data = request
        .data
        .as_ref()
        .ok_or_else(|| QueryError::invalid_request("insert requires data"))?;
    let (doc_id, body) = split_id(data);
    let id = id.map(str::to_string).or(doc_id);

    let method = if id.is_some() { HttpMethod::Put } else { HttpMethod::Post };
    let mut call = SearchRequest::new(method, target.doc_path(id.as_deref())).json(body);
    if !replace {
        call = call.param("op_type", "create");
    }
    let op = if replace { SearchOp::Replace } else { SearchOp::Insert };
    Ok((op, call))
}

fn bulk_call(
    target: &Target<'_>,
    request: &Request,
    replace: bool,
) -> QueryResult<(SearchOp, SearchRequest)> {
    let action = if replace { "index" } else { "create" };
    let mut lines = String::new();
    for doc in &request.datas {
        let (id, body) = split_id(doc);
        let meta = match id {
            Some(id) => json!({ action: { "_id": id } }),
            None => json!({ action: {} }),
        };
        lines.push_str(&meta.to_string());
        lines.push('\n');
        lines.push_str(&body.to_string());
        lines.push('\n');
    }

    let mut call = SearchRequest::new(HttpMethod::Post, target.bulk_path());
    call.body = Some(SearchPayload::NdJson(lines));
    let op = if replace { SearchOp::BulkReplace } else { SearchOp::BulkInsert };
    Ok((op, call))
}

/// Painless script for updates. Generated from `data` unless `script` is given.
fn script(request: &Request) -> QueryResult<Json> {
    let data = request.data.clone().unwrap_or_default();
    let explicit = request.param_str("script").filter(|s| !s.is_empty());
    if explicit.is_none() && data.is_empty() {
        return Err(QueryError::invalid_request("update requires data or script"));
    }

    let source = match explicit {
        Some(s) => s.to_string(),
        None => data
            .keys()
            .map(|k| format!("ctx._source.{k}=params.{k}", k = k))
            .collect::<Vec<_>>()
            .join(";"),
    };

    let mut body = Map::new();
    match request.param_str("script_type").unwrap_or("inline") {
        "stored" => {
            body.insert("id".into(), json!(source));
        }
        "inline" => {
            body.insert("source".into(), json!(source));
            body.insert("lang".into(), json!("painless"));
        }
        other => {
            return Err(QueryError::invalid_value(format!(
                "unsupported script_type `{}`",
                other
            )))
        }
    }
    if !data.is_empty() {
        body.insert("params".into(), record_to_json(&data));
    }
    Ok(Json::Object(body))
}

/// Search body with projection, sort, window and augmentations
fn search_body(
    request: &Request,
    decode: &DecodeOptions,
    window: Option<(u64, u64)>,
) -> QueryResult<Json> {
    let mut body = Map::new();
    body.insert(
        "query".into(),
        compile_condition(&request.condition)?.to_json(),
    );
    if !request.columns.is_empty() {
        body.insert("_source".into(), json!({ "includes": request.columns }));
    }
    if !decode.highlights.is_empty() {
        body.insert("highlight".into(), HighlightSpec::section(&decode.highlights));
    }
    if let Some(collapse) = request.param("collapse") {
        body.insert("collapse".into(), CollapseSpec::parse(collapse)?.to_json());
    }
    let order = request.order_by();
    if !order.is_empty() {
        body.insert("sort".into(), sort_json(&order));
    }
    if let Some((size, from)) = window {
        body.insert("size".into(), json!(size));
        if from > 0 {
            body.insert("from".into(), json!(from));
        }
    }
    if let Some(track) = request.param("track_total_hits") {
        body.insert("track_total_hits".into(), track.clone());
    }
    Ok(Json::Object(body))
}
